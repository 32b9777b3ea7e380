//! Fehlertypen fuer Matchhall
//!
//! Zentraler Fehler-Enum fuer den Start des Servers. Die Fach-Crates
//! (Protokoll, Sessions, Matchmaking, Relay) definieren eigene Enums.

use thiserror::Error;

use crate::types::{SubscriberId, TopicId};

/// Globaler Result-Alias fuer Matchhall
pub type Result<T> = std::result::Result<T, MatchhallError>;

/// Querschnittliche Fehler im Matchhall-System
///
/// Beide Varianten brechen den Prozessstart ab; zur Laufzeit bleiben
/// Fehler lokal in der jeweiligen Verbindung oder im Listener.
#[derive(Debug, Error)]
pub enum MatchhallError {
    #[error("Socket konnte nicht gebunden werden: {0}")]
    Binden(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

/// Ein Listener ist waehrend eines `push` fehlgeschlagen
///
/// Wird pro Listener isoliert an den [`FaultSink`](crate::event::FaultSink)
/// gemeldet; die Zustellung an andere Listener laeuft weiter.
#[derive(Debug, Clone, Error)]
#[error("Listener-Fehler (subscriber={subscriber}, topic={topic}): {grund}")]
pub struct ListenerFault {
    pub subscriber: SubscriberId,
    pub topic: TopicId,
    pub grund: String,
    /// true wenn der Listener gepanict hat statt einen Fehler zu liefern
    pub panik: bool,
}
