use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::utils::error::ClientError;

/// Maximum raw size of an inbound message, in bytes. Anything longer is
/// rejected before parsing is attempted.
pub const MAX_MESSAGE_BYTES: usize = 65000;

/// Maximum length of a topic name, in characters.
pub const MAX_TOPIC_CHARS: usize = 30;

/// Keys a packet body may never contain; they are protocol fields and are
/// set by the packet constructor instead.
pub const RESERVED_KEYS: [&str; 2] = ["type", "topic"];

/// Identifier assigned to a connection by the server, monotonically
/// increasing from 0 and never reused while the process runs.
pub type ConnectionId = u64;

/// Discriminant of a packet, carried on the wire as a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PacketType {
    /// No-op, used by clients as an idle keep-alive ping.
    Error = 0,
    Echo = 1,
    Subscribe = 2,
    Unsubscribe = 3,
    /// Directly addressed to a single subscriber via `dst`.
    Message = 4,
    Info = 5,
    /// Relayed to every other subscriber of the topic.
    Broadcast = 6,
    /// Sent by the server to existing subscribers when a new peer joins.
    Hello = 7,
}

impl PacketType {
    /// Looks up a wire code. Returns `None` for codes outside the protocol.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Error),
            1 => Some(Self::Echo),
            2 => Some(Self::Subscribe),
            3 => Some(Self::Unsubscribe),
            4 => Some(Self::Message),
            5 => Some(Self::Info),
            6 => Some(Self::Broadcast),
            7 => Some(Self::Hello),
            _ => None,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("unknown packet type code {0}")]
pub struct UnknownPacketType(pub u8);

impl TryFrom<u8> for PacketType {
    type Error = UnknownPacketType;

    fn try_from(code: u8) -> Result<Self, UnknownPacketType> {
        Self::from_code(u64::from(code)).ok_or(UnknownPacketType(code))
    }
}

/// The single wire entity exchanged between client and server.
///
/// Protocol fields are typed members; any remaining application payload is
/// flattened into the same JSON object. Optional fields are omitted from the
/// wire when absent, so a minimal packet serializes to
/// `{"type":2,"topic":"chat"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "type")]
    pub kind: PacketType,
    pub topic: String,
    /// Correlation id, present on requests that expect a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Sender's connection id, stamped by the server and never trusted from
    /// the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<ConnectionId>,
    /// Target connection id, required on `Message` packets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<ConnectionId>,
    /// Other current subscribers, populated by the server on a successful
    /// subscribe response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<ConnectionId>>,
    /// Failure taxonomy string, present only on error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Application payload fields, merged alongside the protocol fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Packet {
    pub fn new(kind: PacketType, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            id: None,
            src: None,
            dst: None,
            peers: None,
            error: None,
            body: Map::new(),
        }
    }

    /// Merges an application payload into the packet.
    ///
    /// The payload must be a JSON object (or null, meaning no payload) and
    /// may not contain the reserved protocol keys, nor any of `forbidden`
    /// (`"id"` for correlated requests, `"dst"` for directed messages).
    pub fn with_body(
        mut self,
        body: Option<Value>,
        forbidden: &[&'static str],
    ) -> Result<Self, ClientError> {
        let map = match body {
            None | Some(Value::Null) => return Ok(self),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ClientError::InvalidBody),
        };

        for key in RESERVED_KEYS {
            if map.contains_key(key) {
                return Err(ClientError::ReservedKey(key));
            }
        }
        for &key in forbidden {
            if map.contains_key(key) {
                return Err(ClientError::ReservedKey(key));
            }
        }

        self.body = map;
        Ok(self)
    }
}

/// Response-carried failures reported back to the offending sender. These
/// never terminate the connection. `Display` yields the exact wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("MessageIsTooLong")]
    MessageIsTooLong,
    #[error("InvalidJSON")]
    InvalidJson,
    #[error("InvalidParams")]
    InvalidParams,
    #[error("TopicNameIsTooLong")]
    TopicNameIsTooLong,
    #[error("AlreadySubscribed")]
    AlreadySubscribed,
    #[error("NotSubscribed")]
    NotSubscribed,
    #[error("NoDestination")]
    NoDestination,
    #[error("UnsupportedMessageType")]
    UnsupportedMessageType,
}

impl RouteError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageIsTooLong => "MessageIsTooLong",
            Self::InvalidJson => "InvalidJSON",
            Self::InvalidParams => "InvalidParams",
            Self::TopicNameIsTooLong => "TopicNameIsTooLong",
            Self::AlreadySubscribed => "AlreadySubscribed",
            Self::NotSubscribed => "NotSubscribed",
            Self::NoDestination => "NoDestination",
            Self::UnsupportedMessageType => "UnsupportedMessageType",
        }
    }
}
