//! # matchhall-observability
//!
//! Observability-Crate fuer Matchhall:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - `FaultSink` fuer Listener-Fehler des Event-Bus

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{router, HealthResponse, HealthStatus, ObservabilityState};
pub use logging::logging_initialisieren;
pub use metrics::{Laufzeitwerte, MatchhallMetrics};

use anyhow::Result;
use std::net::SocketAddr;
use tokio::sync::watch;

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Laeuft bis `shutdown_rx` true meldet.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    state: ObservabilityState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Observability-Server gestartet");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

    tracing::info!("Observability-Server gestoppt");
    Ok(())
}
