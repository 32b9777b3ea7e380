//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Registry, Matchmaking und Event-Bus, die beim Start einmal erzeugt
//! und per `Arc` an alle Verbindungs-Tasks gereicht werden.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use matchhall_core::{topics, EventBus, IdGenerator, TopicId};
use matchhall_matchmaking::MatchmakingCoordinator;
use matchhall_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use matchhall_protocol::MessageType;
use matchhall_session::SessionRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale gleichzeitige TCP-Verbindungen
    pub max_verbindungen: usize,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_verbindungen: 100,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: 64,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Zaehler fuer die Observability-Schicht
#[derive(Debug, Default)]
pub struct SignalingStatistik {
    pub aktive_verbindungen: AtomicUsize,
    pub verbindungen_gesamt: AtomicU64,
    pub abgelehnte_verbindungen: AtomicU64,
    pub fehlerhafte_frames: AtomicU64,
    pub unbekannte_nachrichten: AtomicU64,
}

impl SignalingStatistik {
    pub fn aktive(&self) -> usize {
        self.aktive_verbindungen.load(Ordering::Relaxed)
    }
}

/// Vorab berechnete Topic-Ids der Netzwerk-Topics
#[derive(Debug, Clone, Copy)]
pub struct NetzTopics {
    pub login: TopicId,
    pub logout: TopicId,
    pub match_anfrage: TopicId,
    pub match_abbruch: TopicId,
    pub heartbeat: TopicId,
    pub match_found: TopicId,
    pub match_expired: TopicId,
}

impl NetzTopics {
    fn neu(bus: &EventBus) -> Self {
        Self {
            login: bus.topic(topics::NET_LOGIN),
            logout: bus.topic(topics::NET_LOGOUT),
            match_anfrage: bus.topic(topics::NET_MATCH),
            match_abbruch: bus.topic(topics::NET_MATCH_CANCEL),
            heartbeat: bus.topic(topics::NET_HEARTBEAT),
            match_found: bus.topic(topics::MATCH_FOUND),
            match_expired: bus.topic(topics::MATCH_EXPIRED),
        }
    }

    /// Topic fuer einen eingehenden Nachrichtentyp
    pub fn fuer(&self, typ: MessageType) -> Option<TopicId> {
        match typ {
            MessageType::CsLoginReq => Some(self.login),
            MessageType::CsLogoutReq => Some(self.logout),
            MessageType::CsMatchReq => Some(self.match_anfrage),
            MessageType::CsCancelMatchReq => Some(self.match_abbruch),
            MessageType::CsHeartbeat => Some(self.heartbeat),
            _ => None,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    pub bus: EventBus,
    pub registry: SessionRegistry,
    pub matchmaking: MatchmakingCoordinator,
    pub topics: NetzTopics,
    /// Laufende Nummern fuer Verbindungen
    pub verbindungs_ids: IdGenerator,
    pub statistik: SignalingStatistik,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        bus: EventBus,
        registry: SessionRegistry,
        matchmaking: MatchmakingCoordinator,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            topics: NetzTopics::neu(&bus),
            bus,
            registry,
            matchmaking,
            verbindungs_ids: IdGenerator::neu(),
            statistik: SignalingStatistik::default(),
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
