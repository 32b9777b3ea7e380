//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//! Binden und Starten sind getrennt, damit der Aufrufer einen Bind-Fehler
//! vor dem Start sieht und bei Port 0 die echte Adresse erfaehrt.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::connection::ClientConnection;
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// TCP-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    listener: TcpListener,
}

impl SignalingServer {
    /// Bindet den TCP-Socket
    pub async fn binden(state: Arc<SignalingState>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!(adresse = %listener.local_addr()?, "TCP Signaling-Server gebunden");
        Ok(Self { state, listener })
    }

    /// Gibt die lokale Bind-Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &Arc<SignalingState> {
        &self.state
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` true meldet
    ///
    /// Laufende Verbindungs-Tasks sehen dasselbe Signal und bauen ihre
    /// Sessions selbst ab; `starten` kehrt erst zurueck, wenn alle beendet
    /// sind.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!("TCP Signaling-Server gestartet");
        let mut verbindungen = JoinSet::new();

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let max = self.state.config.max_verbindungen;
                            if self.state.statistik.aktive() >= max {
                                self.state
                                    .statistik
                                    .abgelehnte_verbindungen
                                    .fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max,
                                    fehler = %SignalingError::ServerVoll,
                                    "Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }

                            let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr);
                            let shutdown_rx_clone = shutdown_rx.clone();
                            verbindungen.spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Beendete Verbindungs-Tasks einsammeln
                Some(ergebnis) = verbindungen.join_next(), if !verbindungen.is_empty() => {
                    if let Err(e) = ergebnis {
                        tracing::error!(fehler = %e, "Verbindungs-Task abgebrochen");
                    }
                }

                // Shutdown-Signal
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        let offen = verbindungen.len();
        if offen > 0 {
            tracing::debug!(offen, "Warte auf Verbindungs-Tasks");
        }
        while let Some(ergebnis) = verbindungen.join_next().await {
            if let Err(e) = ergebnis {
                tracing::error!(fehler = %e, "Verbindungs-Task abgebrochen");
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
    }
}
