//! Fehlertypen des Matchmakings

use thiserror::Error;

pub type MatchmakingResult<T> = std::result::Result<T, MatchmakingError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchmakingError {
    /// Kein Relay-Endpunkt hat freie Kapazitaet
    #[error("Keine Relay-Kapazitaet frei (Gruppe mit {gruppe} Spielern wartet weiter)")]
    NoCapacity { gruppe: usize },

    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(String),
}
