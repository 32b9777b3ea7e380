//! Fehlertypen fuer das Wire-Protokoll

use thiserror::Error;

/// Result-Alias fuer Protokoll-Operationen
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Ungueltige Laenge oder abgebrochener Stream; die Verbindung wird geschlossen
    #[error("Fehlerhafter Frame: {0}")]
    MalformedFrame(String),

    /// Body passt nicht zum erwarteten Nachrichtentyp
    #[error("Schema passt nicht ({typ}): {grund}")]
    SchemaMismatch { typ: &'static str, grund: String },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }
}
