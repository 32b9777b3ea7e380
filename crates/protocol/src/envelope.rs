//! Envelope – der typisierte Container fuer jede Nachricht
//!
//! Ein Envelope besteht aus Nachrichtentyp, Fehlercode und Body. Der Body
//! ist eine Protobuf-kodierte Nachricht aus [`crate::messages`] und nur
//! dann aussagekraeftig, wenn der Fehlercode [`ErrorCode::OK`] ist.

use bytes::Bytes;
use prost::Message;

use crate::error::{ProtocolError, ProtocolResult};

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Stabiler Nachrichtentyp (u16 auf dem Draht)
///
/// `Cs*` = Client -> Server, `Sc*` = Server -> Client. Unbekannte Codes
/// bleiben als [`MessageType::Unbekannt`] erhalten, damit der Server mit
/// einem Fehler antworten kann statt die Verbindung zu verlieren.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // --- Control-Plane (TCP) ---
    CsLoginReq,
    ScLoginRes,
    CsLogoutReq,
    ScLogoutRes,
    CsMatchReq,
    ScMatchRes,
    CsCancelMatchReq,
    ScCancelMatchRes,
    CsHeartbeat,
    ScHeartbeat,
    /// Unaufgeforderte Fehlermeldung des Servers
    ScError,

    // --- Data-Plane (UDP) ---
    CsJoinRoom,
    ScJoinRoom,
    CsLeaveRoom,
    /// Spieldaten, die das Relay unveraendert weiterleitet
    Relay,

    Unbekannt(u16),
}

impl MessageType {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::CsLoginReq => 1001,
            Self::ScLoginRes => 1002,
            Self::CsLogoutReq => 1003,
            Self::ScLogoutRes => 1004,
            Self::CsMatchReq => 1005,
            Self::ScMatchRes => 1006,
            Self::CsCancelMatchReq => 1007,
            Self::ScCancelMatchRes => 1008,
            Self::CsHeartbeat => 1009,
            Self::ScHeartbeat => 1010,
            Self::ScError => 1099,
            Self::CsJoinRoom => 2001,
            Self::ScJoinRoom => 2002,
            Self::CsLeaveRoom => 2003,
            Self::Relay => 2100,
            Self::Unbekannt(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            1001 => Self::CsLoginReq,
            1002 => Self::ScLoginRes,
            1003 => Self::CsLogoutReq,
            1004 => Self::ScLogoutRes,
            1005 => Self::CsMatchReq,
            1006 => Self::ScMatchRes,
            1007 => Self::CsCancelMatchReq,
            1008 => Self::ScCancelMatchRes,
            1009 => Self::CsHeartbeat,
            1010 => Self::ScHeartbeat,
            1099 => Self::ScError,
            2001 => Self::CsJoinRoom,
            2002 => Self::ScJoinRoom,
            2003 => Self::CsLeaveRoom,
            2100 => Self::Relay,
            other => Self::Unbekannt(other),
        }
    }

    /// Passender Antworttyp fuer eine Anfrage
    pub fn antwort(self) -> Option<Self> {
        match self {
            Self::CsLoginReq => Some(Self::ScLoginRes),
            Self::CsLogoutReq => Some(Self::ScLogoutRes),
            Self::CsMatchReq => Some(Self::ScMatchRes),
            Self::CsCancelMatchReq => Some(Self::ScCancelMatchRes),
            Self::CsHeartbeat => Some(Self::ScHeartbeat),
            Self::CsJoinRoom => Some(Self::ScJoinRoom),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbekannt(code) => write!(f, "Unbekannt({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Fehlercodes im Envelope-Header
pub struct ErrorCode;

impl ErrorCode {
    pub const OK: u32 = 0;
    /// Body liess sich nicht als erwarteter Typ dekodieren
    pub const SCHEMA_MISMATCH: u32 = 1;
    /// Aktion erfordert einen Login
    pub const NOT_LOGGED_IN: u32 = 2;
    /// Verbindung ist bereits eingeloggt
    pub const ALREADY_LOGGED_IN: u32 = 3;
    /// Account ist ueber eine andere Verbindung aktiv
    pub const ACCOUNT_IN_USE: u32 = 4;
    /// Kein Handler fuer diesen Nachrichtentyp
    pub const UNKNOWN_MESSAGE: u32 = 5;
    pub const INTERNAL: u32 = 6;
    /// Raum auf dem Relay unbekannt
    pub const ROOM_NOT_FOUND: u32 = 7;
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_type: MessageType,
    pub error_code: u32,
    pub body: Bytes,
}

impl Envelope {
    /// Envelope mit Fehlercode 0
    pub fn neu(message_type: MessageType, body: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            error_code: ErrorCode::OK,
            body: body.into(),
        }
    }

    /// Envelope mit Protobuf-Body
    pub fn aus_nachricht<M: Message>(message_type: MessageType, nachricht: &M) -> Self {
        Self::neu(message_type, serialize_body(nachricht))
    }

    /// Fehler-Envelope ohne Body
    pub fn fehler(message_type: MessageType, error_code: u32) -> Self {
        Self {
            message_type,
            error_code,
            body: Bytes::new(),
        }
    }

    pub fn ist_ok(&self) -> bool {
        self.error_code == ErrorCode::OK
    }

    /// Dekodiert den Body als `M`
    pub fn body_lesen<M: Message + Default>(&self) -> ProtocolResult<M> {
        deserialize_body(&self.body)
    }
}

// ---------------------------------------------------------------------------
// Body-Serialisierung
// ---------------------------------------------------------------------------

/// Kodiert eine Nachricht als Protobuf
pub fn serialize_body<M: Message>(nachricht: &M) -> Bytes {
    Bytes::from(nachricht.encode_to_vec())
}

/// Dekodiert einen Protobuf-Body
///
/// # Fehler
/// - `SchemaMismatch` wenn die Bytes nicht zum Schema von `M` passen
pub fn deserialize_body<M: Message + Default>(bytes: &[u8]) -> ProtocolResult<M> {
    M::decode(bytes).map_err(|e| ProtocolError::SchemaMismatch {
        typ: std::any::type_name::<M>(),
        grund: e.to_string(),
    })
}
