//! Fehlertypen der Session-Registry

use matchhall_core::SessionId;
use thiserror::Error;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Interne Invariante verletzt: zwei Sessions fuer denselben Schluessel
    #[error("Doppelte Session fuer Account '{account}': {vorhanden} und {neu}")]
    DuplicateSession {
        account: String,
        vorhanden: SessionId,
        neu: SessionId,
    },
}
