//! The `transport` module is responsible for network communication with
//! clients via WebSockets.
//!
//! It implements the WebSocket server itself: accepting connections,
//! running per-connection read and write loops, and forwarding inbound
//! messages to the router.

pub mod websocket;

pub use websocket::Server;
