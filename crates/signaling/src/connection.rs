//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Frames werden der Reihe nach dispatcht, Antworten
//! laufen ueber die Send-Queue des `TransportHandle` zurueck.
//!
//! ## Loop
//! ```text
//! select! (biased)
//!   1. Shutdown          -> Ende
//!   2. Trennung          -> Ende (Send-Queue lief ueber)
//!   3. Send-Queue        -> framed.send
//!   4. Eingehender Frame -> MessageDispatcher::dispatch
//!   5. Idle-Timeout      -> Ende
//! ```
//!
//! Die Send-Queue hat Vorrang vor neuen Frames: alle Antworten auf einen
//! Frame sind geschrieben, bevor der naechste gelesen wird.
//!
//! ## Ende
//! Bei jedem Ende (Client weg, Timeout, `MalformedFrame`, Schreibfehler,
//! Shutdown) wird das Ticket zurueckgezogen und die Session entfernt.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use matchhall_core::ConnectionId;
use matchhall_protocol::{Envelope, FrameCodec, ProtocolError};
use matchhall_session::TransportHandle;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::context::RequestContext;
use crate::dispatcher::MessageDispatcher;
use crate::error::SignalingError;
use crate::handlers::login_handler;
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Zaehlt beim Erzeugen als aktive Verbindung und beim Drop wieder ab.
pub struct ClientConnection {
    state: Arc<SignalingState>,
    verbindung: ConnectionId,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        let verbindung = ConnectionId(state.verbindungs_ids.naechste());
        state
            .statistik
            .aktive_verbindungen
            .fetch_add(1, Ordering::Relaxed);
        state
            .statistik
            .verbindungen_gesamt
            .fetch_add(1, Ordering::Relaxed);
        Self {
            state,
            verbindung,
            peer_addr,
        }
    }

    pub fn verbindung(&self) -> ConnectionId {
        self.verbindung
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung endet oder `shutdown_rx` true meldet.
    pub async fn verarbeiten(self, stream: TcpStream, mut shutdown_rx: watch::Receiver<bool>) {
        let config = Arc::clone(&self.state.config);
        let idle = Duration::from_secs(config.verbindungs_timeout_sek);
        let peer = self.peer_addr;

        tracing::info!(peer = %peer, verbindung = %self.verbindung, "Neue Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::with_max_size(config.max_frame_groesse));
        let (sende_tx, mut sende_rx) = mpsc::channel::<Envelope>(config.send_queue_groesse);
        let ctx = RequestContext::neu(
            self.verbindung,
            peer,
            TransportHandle::neu(self.verbindung, sende_tx),
        );
        let mut trenn_rx = ctx.transport.trenn_signal();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let leerlauf = tokio::time::sleep(idle);
        tokio::pin!(leerlauf);

        let grund: Option<SignalingError> = loop {
            tokio::select! {
                biased;

                // Shutdown-Signal
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer, "Shutdown-Signal – Verbindung wird getrennt");
                        break None;
                    }
                }

                // Pflichtnachricht passte nicht mehr in die Send-Queue
                result = trenn_rx.changed() => {
                    if result.is_err() || *trenn_rx.borrow() {
                        break Some(SignalingError::SendQueueVoll);
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        break Some(e.into());
                    }
                }

                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(envelope)) => {
                            leerlauf.as_mut().reset(Instant::now() + idle);
                            tracing::trace!(
                                peer = %peer,
                                typ = %envelope.message_type,
                                bytes = envelope.body.len(),
                                "Nachricht empfangen"
                            );
                            dispatcher.dispatch(&ctx, envelope);
                        }
                        Some(Err(e)) => {
                            if matches!(e, ProtocolError::MalformedFrame(_)) {
                                self.state
                                    .statistik
                                    .fehlerhafte_frames
                                    .fetch_add(1, Ordering::Relaxed);
                            }
                            break Some(e.into());
                        }
                        None => {
                            tracing::info!(peer = %peer, "Verbindung vom Client getrennt");
                            break None;
                        }
                    }
                }

                // Keine Daten innerhalb des Zeitlimits
                () = &mut leerlauf => {
                    break Some(SignalingError::Timeout);
                }
            }
        };

        if let Some(e) = grund {
            tracing::warn!(peer = %peer, verbindung = %self.verbindung, fehler = %e, "Verbindung beendet");
        }

        self.aufraeumen(&ctx);
    }

    /// Gibt die Session dieser Verbindung frei
    fn aufraeumen(&self, ctx: &RequestContext) {
        if let Some(session) = ctx.session_nehmen() {
            tracing::debug!(
                account = session.account(),
                session = %session.id(),
                verbindung = %self.verbindung,
                "Session wird abgebaut"
            );
            login_handler::session_beenden(&self.state, &session, ctx);
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.state
            .statistik
            .aktive_verbindungen
            .fetch_sub(1, Ordering::Relaxed);
    }
}
