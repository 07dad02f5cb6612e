//! The `client` module implements the relay client: the connection state
//! machine with optional automatic reconnection, correlation of
//! request/response operations, the per-topic handler map, and the idle
//! keep-alive timer.

pub mod client;
pub mod correlator;
pub mod handlers;
mod keep_alive;

pub use client::{Client, ClientOptions, ConnectionState, ReconnectPolicy};
pub use handlers::HandlerId;
