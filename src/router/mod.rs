//! The `router` module is the server core: the subscription registry that
//! records which connection is interested in which topic, the connection
//! table holding each connection's outbound channel, and the dispatcher that
//! validates inbound packets and executes the protocol against both.

pub mod dispatcher;
pub mod registry;
pub mod table;

pub use dispatcher::Router;
pub use registry::Registry;
pub use table::ConnectionTable;

#[cfg(test)]
mod tests;
