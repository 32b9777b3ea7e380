//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::time::Duration;

use matchhall_core::MatchhallError;
use matchhall_matchmaking::{MatchmakingConfig, RelayEndpoint};
use matchhall_observability::logging::{log_format_gueltig, log_level_gueltig};
use matchhall_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use matchhall_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Frame-Grenzen des TCP-Protokolls
    pub protokoll: ProtokollEinstellungen,
    /// Matchmaking-Einstellungen
    pub matchmaking: MatchmakingEinstellungen,
    /// Relay-Pool und Raum-Timeout
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer TCP und UDP
    pub bind_adresse: String,
    /// Port fuer die TCP Control-Plane
    pub tcp_port: u16,
    /// Port fuer das UDP-Relay
    pub udp_port: u16,
    /// Maximale gleichzeitige TCP-Verbindungen
    pub max_verbindungen: usize,
    /// Verbindungen ohne Frame so lange werden getrennt
    pub verbindungs_timeout_sek: u64,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 12800,
            udp_port: 12900,
            max_verbindungen: 100,
            verbindungs_timeout_sek: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtokollEinstellungen {
    /// Maximale Frame-Groesse in Bytes (Typ + Code + Body)
    pub max_frame_groesse: usize,
}

impl Default for ProtokollEinstellungen {
    fn default() -> Self {
        Self {
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingEinstellungen {
    /// Spieler pro Raum
    pub party_groesse: usize,
    /// Maximale Wartezeit eines Tickets (fehlt = unbegrenzt)
    pub ticket_ablauf_sek: Option<u64>,
    /// Intervall fuer Ablauf-Pruefung und erneute Gruppenbildung
    pub tick_ms: u64,
}

impl Default for MatchmakingEinstellungen {
    fn default() -> Self {
        Self {
            party_groesse: 2,
            ticket_ablauf_sek: None,
            tick_ms: 500,
        }
    }
}

/// Ein Relay-Endpunkt im statischen Pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayEndpunktEinstellung {
    /// Adresse, die Clients fuer das Relay verwenden
    pub adresse: String,
    pub port: u16,
    /// Maximale gleichzeitige Raeume auf diesem Endpunkt
    pub kapazitaet: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    pub endpunkte: Vec<RelayEndpunktEinstellung>,
    /// Raeume ohne Datagramm so lange werden geschlossen
    pub raum_timeout_sek: u64,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            endpunkte: vec![RelayEndpunktEinstellung {
                adresse: "127.0.0.1".into(),
                port: 12900,
                kapazitaet: 64,
            }],
            raum_timeout_sek: 60,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> matchhall_core::Result<()> {
        let fehler = |msg: String| Err(MatchhallError::Konfiguration(msg));

        if self.matchmaking.party_groesse == 0 {
            return fehler("matchmaking.party_groesse muss mindestens 1 sein".into());
        }
        if self.matchmaking.tick_ms == 0 {
            return fehler("matchmaking.tick_ms muss groesser 0 sein".into());
        }
        if self.relay.endpunkte.is_empty() {
            return fehler("relay.endpunkte darf nicht leer sein".into());
        }
        if let Some(ep) = self.relay.endpunkte.iter().find(|e| e.kapazitaet == 0) {
            return fehler(format!(
                "relay.endpunkte: Kapazitaet 0 fuer {}:{}",
                ep.adresse, ep.port
            ));
        }
        if self.protokoll.max_frame_groesse < matchhall_protocol::wire::HEADER_SIZE {
            return fehler("protokoll.max_frame_groesse ist kleiner als der Frame-Header".into());
        }
        // Direktiven wie "matchhall_relay=trace" gehen ungeprueft an den EnvFilter
        let level = self.logging.level.trim();
        let einfach = !level.contains('=') && !level.contains(',');
        if level.is_empty() || (einfach && !log_level_gueltig(level)) {
            return fehler(format!("logging.level '{}' ungueltig", self.logging.level));
        }
        if !log_format_gueltig(&self.logging.format) {
            return fehler(format!("logging.format '{}' unbekannt", self.logging.format));
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die vollstaendige Bind-Adresse fuer UDP zurueck
    pub fn udp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.udp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            max_verbindungen: self.netzwerk.max_verbindungen,
            verbindungs_timeout_sek: self.netzwerk.verbindungs_timeout_sek,
            max_frame_groesse: self.protokoll.max_frame_groesse,
            ..SignalingConfig::default()
        }
    }

    pub fn matchmaking_config(&self) -> MatchmakingConfig {
        MatchmakingConfig {
            party_groesse: self.matchmaking.party_groesse,
            ticket_ablauf: self.matchmaking.ticket_ablauf_sek.map(Duration::from_secs),
        }
    }

    /// Endpunkte mit Kapazitaet fuer den `StaticRelayPool`
    pub fn relay_pool(&self) -> Vec<(RelayEndpoint, usize)> {
        self.relay
            .endpunkte
            .iter()
            .map(|e| {
                (
                    RelayEndpoint {
                        adresse: e.adresse.clone(),
                        port: e.port,
                    },
                    e.kapazitaet,
                )
            })
            .collect()
    }
}
