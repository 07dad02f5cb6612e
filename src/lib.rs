//! # Switchboard
//!
//! `switchboard` is a minimal publish/subscribe relay over persistent
//! WebSocket connections. A central router accepts many client connections,
//! lets each client declare interest in named topics, and relays broadcast
//! or directly-addressed messages between interested clients. It keeps no
//! history and has no persistence; it is a pure in-memory switch.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `protocol`: The wire format shared by server and client: packet envelope, type codes, limits, error taxonomy.
//! - `router`: The server core: subscription registry, connection table, and the validating dispatcher.
//! - `client`: The relay client: connection state machine, reconnection, operation correlation, topic handlers, keep-alive.
//! - `config`: Handles loading and managing configuration.
//! - `transport`: Manages the WebSocket server and communication with clients.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod client;
pub mod config;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod utils;
