//! matchhall-server – Bibliotheks-Root
//!
//! Verdrahtet alle Subsysteme und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.
//!
//! ```text
//!                      EventBus (FaultSink = MatchhallMetrics)
//!   net.*  ---------->  Signaling-Handler -> SessionRegistry / Matchmaking
//!   match.found ----->  Sessions (Assigned), RoomDirectory (Raum anlegen)
//!   relay.room_closed > Matchmaking::release_room
//! ```

pub mod config;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use config::ServerConfig;
use matchhall_core::{topics, EventBus, IdGenerator, MatchhallError, RoomId, SubscriberId};
use matchhall_matchmaking::{MatchAssignment, MatchmakingCoordinator, StaticRelayPool};
use matchhall_observability::{Laufzeitwerte, MatchhallMetrics, ObservabilityState};
use matchhall_relay::{RelayServer, RelayServerConfig, RoomDirectory};
use matchhall_session::SessionRegistry;
use matchhall_signaling::{handlers, SignalingServer, SignalingState};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Gebundener, noch nicht laufender Server
///
/// `binden` bricht nur bei Konfigurations- oder Bind-Fehlern ab; danach
/// laeuft alles bis zum Shutdown-Signal.
pub struct Server {
    config: ServerConfig,
    bus: EventBus,
    metriken: MatchhallMetrics,
    registry: SessionRegistry,
    matchmaking: MatchmakingCoordinator,
    raeume: RoomDirectory,
    signaling: Arc<SignalingState>,
    tcp: SignalingServer,
    relay: Arc<RelayServer>,
}

impl Server {
    /// Baut alle Subsysteme auf und bindet TCP- und UDP-Socket
    pub async fn binden(config: ServerConfig) -> Result<Self> {
        config.validieren()?;

        let metriken = MatchhallMetrics::neu()?;
        let bus = EventBus::mit_fault_sink(Arc::new(metriken.clone()));
        let ids = Arc::new(IdGenerator::neu());

        let registry = SessionRegistry::neu(Arc::clone(&ids), bus.clone());
        let pool = StaticRelayPool::neu(config.relay_pool())?;
        let matchmaking = MatchmakingCoordinator::neu(
            config.matchmaking_config(),
            ids,
            Arc::new(pool),
            bus.clone(),
        )?;

        let raeume = RoomDirectory::neu(bus.clone());
        raeume.an_bus_anbinden();
        bus_anbinden(&bus, &matchmaking, &metriken);

        let signaling = SignalingState::neu(
            config.signaling_config(),
            bus.clone(),
            registry.clone(),
            matchmaking.clone(),
        );
        handlers::alle_registrieren(&signaling);

        let tcp_addr = adresse_parsen(&config.tcp_bind_adresse())?;
        let tcp = SignalingServer::binden(Arc::clone(&signaling), tcp_addr)
            .await
            .map_err(|e| MatchhallError::Binden(format!("TCP {tcp_addr}: {e}")))?;

        let udp_addr = adresse_parsen(&config.udp_bind_adresse())?;
        let mut relay_config = RelayServerConfig::neu(udp_addr);
        relay_config.raum_timeout = Duration::from_secs(config.relay.raum_timeout_sek);
        let relay = RelayServer::binden(relay_config, raeume.clone())
            .await
            .map_err(|e| MatchhallError::Binden(format!("UDP {udp_addr}: {e}")))?;

        Ok(Self {
            config,
            bus,
            metriken,
            registry,
            matchmaking,
            raeume,
            signaling,
            tcp,
            relay: Arc::new(relay),
        })
    }

    pub fn tcp_adresse(&self) -> std::io::Result<SocketAddr> {
        self.tcp.lokale_adresse()
    }

    pub fn udp_adresse(&self) -> std::io::Result<SocketAddr> {
        self.relay.lokale_adresse()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn matchmaking(&self) -> &MatchmakingCoordinator {
        &self.matchmaking
    }

    pub fn raeume(&self) -> &RoomDirectory {
        &self.raeume
    }

    pub fn metriken(&self) -> &MatchhallMetrics {
        &self.metriken
    }

    /// Aktuelle Kennzahlen aller Subsysteme
    pub fn laufzeitwerte(&self) -> Laufzeitwerte {
        laufzeitwerte(&self.signaling, &self.raeume)
    }

    /// Startet alle Loops und laeuft bis `shutdown_rx` true meldet
    ///
    /// Reihenfolge:
    /// 1. TCP Accept-Loop (Control-Plane)
    /// 2. UDP Empfangs-Loop (Relay)
    /// 3. Matchmaking-Tick
    /// 4. Observability-HTTP-Server (falls aktiviert)
    pub async fn laufen(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            tcp = %self.tcp_adresse()?,
            udp = %self.udp_adresse()?,
            party_groesse = self.config.matchmaking.party_groesse,
            relay_endpunkte = self.config.relay.endpunkte.len(),
            "Server startet"
        );

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let Server {
            config,
            bus,
            matchmaking,
            raeume,
            signaling,
            tcp,
            relay,
            metriken,
            ..
        } = self;

        tasks.push(("tcp", tokio::spawn(tcp.starten(shutdown_rx.clone()))));

        let relay_rx = shutdown_rx.clone();
        tasks.push((
            "relay",
            tokio::spawn(async move { relay.empfangs_loop_starten(relay_rx).await }),
        ));

        tasks.push((
            "matchmaking",
            tokio::spawn(tick_loop(
                matchmaking,
                Duration::from_millis(config.matchmaking.tick_ms),
                shutdown_rx.clone(),
            )),
        ));

        let obs_state = if config.observability.aktiviert {
            let quelle_signaling = Arc::clone(&signaling);
            let quelle_raeume = raeume.clone();
            let state = ObservabilityState::neu(metriken, move || {
                laufzeitwerte(&quelle_signaling, &quelle_raeume)
            });
            let addr = adresse_parsen(&config.observability_bind_adresse())?;
            let obs_rx = shutdown_rx.clone();
            let obs = state.clone();
            tasks.push((
                "observability",
                tokio::spawn(async move {
                    if let Err(e) =
                        matchhall_observability::observability_server_starten(addr, obs, obs_rx)
                            .await
                    {
                        tracing::error!(fehler = %e, "Observability-Server beendet");
                    }
                }),
            ));
            Some(state)
        } else {
            None
        };

        tracing::info!("Server laeuft");

        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        if let Some(state) = &obs_state {
            state.bereit_setzen(false);
        }

        for (name, handle) in tasks {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task beendet"),
                Ok(Err(e)) => tracing::error!(task = name, fehler = %e, "Task abgebrochen"),
                Err(_) => tracing::warn!(task = name, "Task nicht rechtzeitig beendet"),
            }
        }

        // Listener halten Klone von Bus-Nutzern; ohne Abmeldung bleibt ein Zyklus
        for subscriber in [SubscriberId::SERVER, SubscriberId::RELAY, SubscriberId::SIGNALING] {
            bus.clear_all_event_register(subscriber);
        }

        tracing::info!(
            sessions = signaling.registry.anzahl(),
            uptime_sek = signaling.uptime_sek(),
            "Server gestoppt"
        );
        Ok(())
    }

    /// Laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut lauf = tokio::spawn(self.laufen(shutdown_rx));

        tokio::select! {
            // Vorzeitiges Ende nur bei Fehler
            ergebnis = &mut lauf => return ergebnis?,
            ergebnis = tokio::signal::ctrl_c() => ergebnis?,
        }

        tracing::info!("Ctrl-C empfangen");
        let _ = shutdown_tx.send(true);
        lauf.await?
    }
}

fn adresse_parsen(adresse: &str) -> matchhall_core::Result<SocketAddr> {
    adresse
        .parse()
        .map_err(|e| MatchhallError::Konfiguration(format!("Adresse '{adresse}' ungueltig: {e}")))
}

fn laufzeitwerte(signaling: &SignalingState, raeume: &RoomDirectory) -> Laufzeitwerte {
    let statistik = &signaling.statistik;
    Laufzeitwerte {
        sessions: signaling.registry.anzahl(),
        sessions_online: signaling.registry.online_anzahl(),
        verbindungen_aktiv: statistik.aktive(),
        verbindungen_gesamt: statistik.verbindungen_gesamt.load(Ordering::Relaxed),
        fehlerhafte_frames: statistik.fehlerhafte_frames.load(Ordering::Relaxed),
        unbekannte_nachrichten: statistik.unbekannte_nachrichten.load(Ordering::Relaxed),
        tickets_wartend: signaling.matchmaking.queue_len(),
        raeume: raeume.anzahl(),
    }
}

/// Server-eigene Listener: Relay-Platz freigeben und Ereignisse zaehlen
fn bus_anbinden(bus: &EventBus, matchmaking: &MatchmakingCoordinator, metriken: &MatchhallMetrics) {
    let mm = matchmaking.clone();
    let geschlossen = metriken.rooms_closed_total.clone();
    bus.add_listener1(
        SubscriberId::SERVER,
        bus.topic(topics::RELAY_ROOM_CLOSED),
        move |room: &RoomId| {
            geschlossen.inc();
            mm.release_room(*room);
            Ok(())
        },
    );

    let matches = metriken.matches_total.clone();
    bus.add_listener1(
        SubscriberId::SERVER,
        bus.topic(topics::MATCH_FOUND),
        move |_: &MatchAssignment| {
            matches.inc();
            Ok(())
        },
    );

    let ohne_platz = metriken.no_capacity_total.clone();
    bus.add_listener1(
        SubscriberId::SERVER,
        bus.topic(topics::MATCH_NO_CAPACITY),
        move |_: &usize| {
            ohne_platz.inc();
            Ok(())
        },
    );

    let abgelaufen = metriken.tickets_expired_total.clone();
    bus.add_listener1(
        SubscriberId::SERVER,
        bus.topic(topics::MATCH_EXPIRED),
        move |_: &String| {
            abgelaufen.inc();
            Ok(())
        },
    );
}

/// Treibt Ticket-Ablauf und erneute Gruppenbildung
async fn tick_loop(
    matchmaking: MatchmakingCoordinator,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = takt.tick() => {
                let report = matchmaking.tick(Instant::now());
                if report.abgelaufen > 0 || report.zuweisungen > 0 {
                    tracing::debug!(
                        abgelaufen = report.abgelaufen,
                        zuweisungen = report.zuweisungen,
                        wartend = matchmaking.queue_len(),
                        "Matchmaking-Tick"
                    );
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Matchmaking-Tick beendet");
}
