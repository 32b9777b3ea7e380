//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Config-Datei):
//! - `MH_LOG_LEVEL`: Filter-Direktive (z.B. `info`, `matchhall_relay=trace`)
//! - `MH_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "MH_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "MH_LOG_FORMAT";

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Unbekannte Werte fallen auf `Text` zurueck
    pub fn parsen(wert: &str) -> Self {
        match wert {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Initialisiert das Logging-System
///
/// Darf pro Prozess nur einmal aufgerufen werden; ein zweiter Aufruf wird
/// ignoriert und als Warnung geloggt.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = LogFormat::parsen(&format_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format));

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if let Err(e) = ergebnis {
        tracing::warn!(fehler = %e, "Logging war bereits initialisiert");
    }
}

/// Umgebungswert vor Config-Wert
fn format_waehlen(aus_env: Option<String>, aus_config: &str) -> String {
    aus_env
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| aus_config.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
