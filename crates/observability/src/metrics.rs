//! Prometheus-kompatible Metriken fuer Matchhall
//!
//! Registrierte Metriken:
//! - `matchhall_sessions` – Gauge: Registrierte Sessions
//! - `matchhall_sessions_online` – Gauge: Sessions mit lebender Verbindung
//! - `matchhall_connections_active` – Gauge: Offene TCP-Verbindungen
//! - `matchhall_queue_tickets` – Gauge: Wartende Matchmaking-Tickets
//! - `matchhall_relay_rooms` – Gauge: Offene Relay-Raeume
//! - `matchhall_connections_total` – Counter: Angenommene TCP-Verbindungen
//! - `matchhall_malformed_frames_total` – Counter: Verbindungen mit kaputtem Frame
//! - `matchhall_unknown_messages_total` – Counter: Nachrichten ohne Handler
//! - `matchhall_matches_total` – Counter: Gebildete Gruppen
//! - `matchhall_no_capacity_total` – Counter: Gruppenbildung ohne Relay-Platz
//! - `matchhall_tickets_expired_total` – Counter: Abgelaufene Tickets
//! - `matchhall_rooms_closed_total` – Counter: Geschlossene Relay-Raeume
//! - `matchhall_listener_faults_total` – Counter: Bus-Listener-Fehler (art)
//!
//! Gauges und die Zaehler der Verbindungsschicht werden beim Scrape aus
//! einem `Laufzeitwerte`-Snapshot nachgezogen; Bus-Ereignisse zaehlt der
//! Server direkt.

use anyhow::Result;
use matchhall_core::{FaultSink, ListenerFault, SubscriberId, TopicId};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Momentaufnahme der Laufzeit-Zustaende fuer einen Scrape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Laufzeitwerte {
    pub sessions: usize,
    pub sessions_online: usize,
    pub verbindungen_aktiv: usize,
    pub verbindungen_gesamt: u64,
    pub fehlerhafte_frames: u64,
    pub unbekannte_nachrichten: u64,
    pub tickets_wartend: usize,
    pub raeume: usize,
}

/// Alle Matchhall-Prometheus-Metriken
#[derive(Clone)]
pub struct MatchhallMetrics {
    pub registry: Arc<Registry>,

    // Zustand
    pub sessions: IntGauge,
    pub sessions_online: IntGauge,
    pub connections_active: IntGauge,
    pub queue_tickets: IntGauge,
    pub relay_rooms: IntGauge,

    // Verbindungsschicht
    pub connections_total: IntCounter,
    pub malformed_frames_total: IntCounter,
    pub unknown_messages_total: IntCounter,

    // Bus-Ereignisse
    pub matches_total: IntCounter,
    pub no_capacity_total: IntCounter,
    pub tickets_expired_total: IntCounter,
    pub rooms_closed_total: IntCounter,
    pub listener_faults_total: IntCounterVec,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn counter(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl MatchhallMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();
        let r = &registry;

        let listener_faults_total = IntCounterVec::new(
            Opts::new(
                "matchhall_listener_faults_total",
                "Fehlgeschlagene oder uebersprungene Bus-Listener",
            ),
            &["art"],
        )?;
        registry.register(Box::new(listener_faults_total.clone()))?;

        Ok(Self {
            sessions: gauge(r, "matchhall_sessions", "Registrierte Sessions")?,
            sessions_online: gauge(r, "matchhall_sessions_online", "Sessions mit lebender Verbindung")?,
            connections_active: gauge(r, "matchhall_connections_active", "Offene TCP-Verbindungen")?,
            queue_tickets: gauge(r, "matchhall_queue_tickets", "Wartende Matchmaking-Tickets")?,
            relay_rooms: gauge(r, "matchhall_relay_rooms", "Offene Relay-Raeume")?,
            connections_total: counter(r, "matchhall_connections_total", "Angenommene TCP-Verbindungen")?,
            malformed_frames_total: counter(
                r,
                "matchhall_malformed_frames_total",
                "Verbindungen, die wegen eines ungueltigen Frames geschlossen wurden",
            )?,
            unknown_messages_total: counter(
                r,
                "matchhall_unknown_messages_total",
                "Nachrichten ohne zustaendigen Handler",
            )?,
            matches_total: counter(r, "matchhall_matches_total", "Gebildete Spielgruppen")?,
            no_capacity_total: counter(
                r,
                "matchhall_no_capacity_total",
                "Gruppenbildungen ohne freien Relay-Platz",
            )?,
            tickets_expired_total: counter(r, "matchhall_tickets_expired_total", "Abgelaufene Tickets")?,
            rooms_closed_total: counter(r, "matchhall_rooms_closed_total", "Geschlossene Relay-Raeume")?,
            listener_faults_total,
            registry: Arc::new(registry),
        })
    }

    /// Zieht Gauges und Verbindungszaehler auf den Snapshot nach
    pub fn aktualisieren(&self, werte: &Laufzeitwerte) {
        self.sessions.set(werte.sessions as i64);
        self.sessions_online.set(werte.sessions_online as i64);
        self.connections_active.set(werte.verbindungen_aktiv as i64);
        self.queue_tickets.set(werte.tickets_wartend as i64);
        self.relay_rooms.set(werte.raeume as i64);

        nachziehen(&self.connections_total, werte.verbindungen_gesamt);
        nachziehen(&self.malformed_frames_total, werte.fehlerhafte_frames);
        nachziehen(&self.unknown_messages_total, werte.unbekannte_nachrichten);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Counter duerfen nur wachsen
fn nachziehen(counter: &IntCounter, ziel: u64) {
    let aktuell = counter.get();
    if ziel > aktuell {
        counter.inc_by(ziel - aktuell);
    }
}

impl FaultSink for MatchhallMetrics {
    fn melden(&self, fault: &ListenerFault) {
        let art = if fault.panik { "panik" } else { "fehler" };
        self.listener_faults_total.with_label_values(&[art]).inc();
        tracing::error!(
            subscriber = %fault.subscriber,
            topic = %fault.topic,
            panik = fault.panik,
            grund = %fault.grund,
            "Listener fehlgeschlagen"
        );
    }

    fn vertragsverletzung(&self, subscriber: SubscriberId, topic: TopicId, grund: &str) {
        self.listener_faults_total
            .with_label_values(&["vertrag"])
            .inc();
        tracing::warn!(
            subscriber = %subscriber,
            topic = %topic,
            grund,
            "Listener uebersprungen: Vertragsverletzung"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = MatchhallMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn snapshot_setzt_gauges() {
        let metriken = MatchhallMetrics::neu().unwrap();
        metriken.aktualisieren(&Laufzeitwerte {
            sessions: 3,
            sessions_online: 2,
            verbindungen_aktiv: 2,
            tickets_wartend: 1,
            raeume: 4,
            ..Default::default()
        });
        assert_eq!(metriken.sessions.get(), 3);
        assert_eq!(metriken.sessions_online.get(), 2);
        assert_eq!(metriken.queue_tickets.get(), 1);
        assert_eq!(metriken.relay_rooms.get(), 4);
    }

    #[test]
    fn zaehler_laufen_nie_rueckwaerts() {
        let metriken = MatchhallMetrics::neu().unwrap();
        let mut werte = Laufzeitwerte {
            verbindungen_gesamt: 10,
            fehlerhafte_frames: 2,
            ..Default::default()
        };
        metriken.aktualisieren(&werte);
        assert_eq!(metriken.connections_total.get(), 10);

        werte.verbindungen_gesamt = 4;
        metriken.aktualisieren(&werte);
        assert_eq!(metriken.connections_total.get(), 10);
        assert_eq!(metriken.malformed_frames_total.get(), 2);
    }

    #[test]
    fn fault_sink_zaehlt_nach_art() {
        let metriken = MatchhallMetrics::neu().unwrap();
        let fault = ListenerFault {
            subscriber: SubscriberId(1),
            topic: TopicId(2),
            grund: "kaputt".into(),
            panik: true,
        };
        metriken.melden(&fault);
        metriken.vertragsverletzung(SubscriberId(1), TopicId(2), "arity");
        metriken.vertragsverletzung(SubscriberId(1), TopicId(2), "typ");

        let c = &metriken.listener_faults_total;
        assert_eq!(c.with_label_values(&["panik"]).get(), 1);
        assert_eq!(c.with_label_values(&["fehler"]).get(), 0);
        assert_eq!(c.with_label_values(&["vertrag"]).get(), 2);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = MatchhallMetrics::neu().unwrap();
        metriken.matches_total.inc();
        metriken.sessions.set(5);

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("matchhall_matches_total 1"));
        assert!(output.contains("matchhall_sessions 5"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
