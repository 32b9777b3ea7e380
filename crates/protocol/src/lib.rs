//! matchhall-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert das Envelope-Format, das TCP-Framing, den
//! UDP-Datagramm-Header und die Protobuf-Nachrichten, die zwischen Client
//! und Server ausgetauscht werden. Es beruehrt nie selbst einen Socket.

pub mod datagram;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod wire;

pub use datagram::{Datagram, DatagramHeader};
pub use envelope::{deserialize_body, serialize_body, Envelope, ErrorCode, MessageType};
pub use error::{ProtocolError, ProtocolResult};
pub use wire::FrameCodec;
