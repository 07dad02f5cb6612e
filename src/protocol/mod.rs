//! The `protocol` module defines the wire format shared by the relay server
//! and the client: the packet envelope, its type discriminant, the response
//! error taxonomy, and the hard protocol limits.

pub mod packet;

pub use packet::{
    ConnectionId, MAX_MESSAGE_BYTES, MAX_TOPIC_CHARS, Packet, PacketType, RouteError,
};
