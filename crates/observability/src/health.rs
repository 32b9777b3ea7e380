//! Health-Check- und Metrik-Endpunkte
//!
//! - `GET /health`  – JSON mit Status, Version, Uptime und Kennzahlen
//! - `GET /metrics` – Prometheus scrape format
//!
//! Beide Handler holen sich beim Aufruf einen frischen `Laufzeitwerte`-
//! Snapshot ueber die vom Server gelieferte Quelle.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{Laufzeitwerte, MatchhallMetrics};

/// Status des Health-Checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: usize,
    pub connections: usize,
    pub queued_tickets: usize,
    pub relay_rooms: usize,
}

type Quelle = Arc<dyn Fn() -> Laufzeitwerte + Send + Sync>;

/// Geteilter Zustand der HTTP-Handler
#[derive(Clone)]
pub struct ObservabilityState {
    pub metriken: MatchhallMetrics,
    start_time: Instant,
    bereit: Arc<AtomicBool>,
    quelle: Quelle,
}

impl ObservabilityState {
    pub fn neu<F>(metriken: MatchhallMetrics, quelle: F) -> Self
    where
        F: Fn() -> Laufzeitwerte + Send + Sync + 'static,
    {
        Self {
            metriken,
            start_time: Instant::now(),
            bereit: Arc::new(AtomicBool::new(true)),
            quelle: Arc::new(quelle),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Beim Herunterfahren auf `false`, damit `/health` 503 liefert
    pub fn bereit_setzen(&self, bereit: bool) {
        self.bereit.store(bereit, Ordering::Relaxed);
    }

    pub fn ist_bereit(&self) -> bool {
        self.bereit.load(Ordering::Relaxed)
    }

    /// Aktueller Snapshot, direkt in die Metriken uebernommen
    pub fn snapshot(&self) -> Laufzeitwerte {
        let werte = (self.quelle)();
        self.metriken.aktualisieren(&werte);
        werte
    }

    pub fn health(&self) -> HealthResponse {
        let werte = self.snapshot();
        HealthResponse {
            status: if self.ist_bereit() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            sessions: werte.sessions,
            connections: werte.verbindungen_aktiv,
            queued_tickets: werte.tickets_wartend,
            relay_rooms: werte.raeume,
        }
    }
}

/// Axum-Router fuer `/health` und `/metrics`
pub fn router(state: ObservabilityState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<ObservabilityState>) -> impl IntoResponse {
    let antwort = state.health();
    let http_status = match antwort.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(antwort))
}

async fn metrics_handler(State(state): State<ObservabilityState>) -> impl IntoResponse {
    state.snapshot();
    match state.metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(fehler = %err, "Metriken-Export fehlgeschlagen");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
