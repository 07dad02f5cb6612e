//! The `error` module defines custom error types used within the
//! `switchboard` application.
//!
//! This module centralizes error handling, providing a consistent way to
//! represent and propagate errors throughout the system.

use thiserror::Error;

/// Failures surfaced to callers of the client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection is gone and, for a non-reconnecting client, will not
    /// come back.
    #[error("the client is disconnected")]
    Disconnected,

    /// The packet body contained a key reserved for a protocol field.
    #[error("key {0:?} is forbidden in a packet body")]
    ReservedKey(&'static str),

    /// The packet body was neither a JSON object nor null.
    #[error("a packet body must be a JSON object")]
    InvalidBody,

    /// The server answered a correlated request with an error response.
    #[error("request rejected by the server: {0}")]
    Rejected(String),

    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("packet serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures starting the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}
