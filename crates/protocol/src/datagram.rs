//! Datagramm-Format fuer das UDP-Relay
//!
//! Jedes Datagramm ist genau eine Nachricht; die Datagramm-Grenze ist die
//! Frame-Grenze, ein Laengen-Feld gibt es nicht.
//!
//! ## Paketformat (Header = 14 Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       4   RoomId (i32 big-endian)
//!  4       8   SenderId / SessionId (i64 big-endian)
//! 12       2   MessageType (u16 big-endian)
//! 14+      N   Nutzdaten (Protobuf oder opake Spieldaten)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use matchhall_core::{RoomId, SessionId};
use prost::Message;

use crate::envelope::{serialize_body, MessageType};
use crate::error::{ProtocolError, ProtocolResult};

/// Maximale Nutzdaten-Laenge (passt sicher in eine Ethernet-MTU)
pub const MAX_NUTZDATEN_LAENGE: usize = 1200;

// ---------------------------------------------------------------------------
// DatagramHeader
// ---------------------------------------------------------------------------

/// 14-Byte Header eines Relay-Datagramms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub room_id: RoomId,
    pub sender: SessionId,
    pub message_type: MessageType,
}

impl DatagramHeader {
    /// Header-Groesse in Bytes
    pub const SIZE: usize = 14;

    pub fn new(room_id: RoomId, sender: SessionId, message_type: MessageType) -> Self {
        Self {
            room_id,
            sender,
            message_type,
        }
    }

    /// Serialisiert den Header in ein 14-Byte-Array (big-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.room_id.0.to_be_bytes());
        buf[4..12].copy_from_slice(&self.sender.0.to_be_bytes());
        buf[12..14].copy_from_slice(&self.message_type.as_u16().to_be_bytes());
        buf
    }

    /// Deserialisiert einen Header aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `MalformedFrame` wenn das Slice kuerzer als 14 Bytes ist
    pub fn decode(buf: &[u8]) -> ProtocolResult<Self> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::malformed(format!(
                "Datagramm zu kurz: {} Bytes (Minimum: {})",
                buf.len(),
                Self::SIZE
            )));
        }
        let room_id = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let mut sender = [0u8; 8];
        sender.copy_from_slice(&buf[4..12]);
        let message_type = u16::from_be_bytes([buf[12], buf[13]]);
        Ok(Self {
            room_id: RoomId(room_id),
            sender: SessionId(i64::from_be_bytes(sender)),
            message_type: MessageType::from_u16(message_type),
        })
    }
}

// ---------------------------------------------------------------------------
// Datagram
// ---------------------------------------------------------------------------

/// Vollstaendiges Datagramm: Header + Nutzdaten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub header: DatagramHeader,
    pub nutzdaten: Bytes,
}

impl Datagram {
    pub fn new(header: DatagramHeader, nutzdaten: impl Into<Bytes>) -> Self {
        Self {
            header,
            nutzdaten: nutzdaten.into(),
        }
    }

    /// Datagramm mit Protobuf-Nutzdaten
    pub fn aus_nachricht<M: Message>(header: DatagramHeader, nachricht: &M) -> Self {
        Self::new(header, serialize_body(nachricht))
    }

    /// Serialisiert das Datagramm in einen Byte-Vektor
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DatagramHeader::SIZE + self.nutzdaten.len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.nutzdaten);
        buf.freeze()
    }

    /// Deserialisiert ein Datagramm
    ///
    /// # Fehler
    /// - `MalformedFrame` bei zu kurzem Header oder zu grossen Nutzdaten
    pub fn decode(buf: &[u8]) -> ProtocolResult<Self> {
        let header = DatagramHeader::decode(buf)?;
        let nutzdaten = &buf[DatagramHeader::SIZE..];
        if nutzdaten.len() > MAX_NUTZDATEN_LAENGE {
            return Err(ProtocolError::malformed(format!(
                "Nutzdaten zu gross: {} Bytes (Maximum: {})",
                nutzdaten.len(),
                MAX_NUTZDATEN_LAENGE
            )));
        }
        Ok(Self {
            header,
            nutzdaten: Bytes::copy_from_slice(nutzdaten),
        })
    }
}
