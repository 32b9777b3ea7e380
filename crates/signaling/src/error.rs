//! Fehlertypen fuer den Signaling-Service

use matchhall_protocol::ProtocolError;
use matchhall_session::SessionError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Protokollfehler (ungueltiger Frame, falsches Schema)
    #[error(transparent)]
    Protokoll(#[from] ProtocolError),

    /// Registry-Invariante verletzt
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Verbindungslimit erreicht
    #[error("Server ist voll")]
    ServerVoll,

    /// Nachricht an den Client passte nicht mehr in die Send-Queue
    #[error("Send-Queue voll")]
    SendQueueVoll,

    /// Keine Daten innerhalb des Zeitlimits
    #[error("Timeout")]
    Timeout,
}
