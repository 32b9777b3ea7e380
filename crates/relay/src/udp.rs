//! UDP Relay Server – ein Socket, ein Empfangs-Loop
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! Datagram::decode()                 <- Header-Validierung
//!     |
//!     +-- CsJoinRoom  -> RoomDirectory::beitreten  -> ScJoinRoom (send_to)
//!     +-- CsLeaveRoom -> RoomDirectory::verlassen
//!     +-- sonst       -> RoomDirectory::ziele -> RoomHandler -> send_to je Ziel
//! ```
//!
//! Es gibt keinen Verbindungszustand pro Client; jedes ausgehende
//! Datagramm wird explizit adressiert.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use matchhall_protocol::messages::{JoinResult, JoinRoomRequest, JoinRoomResponse};
use matchhall_protocol::{deserialize_body, Datagram, DatagramHeader, MessageType};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::error::RelayError;
use crate::handler::RaumKontext;
use crate::room::RoomDirectory;

/// Header 14 + Max-Nutzdaten 1200 + Puffer
const UDP_BUFFER_SIZE: usize = 1500;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Bind-Adresse (z.B. "0.0.0.0:12900")
    pub bind_addr: SocketAddr,
    /// Raeume ohne Datagramm so lange werden geschlossen
    pub raum_timeout: Duration,
    /// Intervall der Inaktivitaets-Pruefung
    pub pruef_intervall: Duration,
}

impl RelayServerConfig {
    /// Erstellt eine Konfiguration mit Standard-Werten
    pub fn neu(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            raum_timeout: Duration::from_secs(60),
            pruef_intervall: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// UDP Relay Server
pub struct RelayServer {
    config: RelayServerConfig,
    socket: Arc<UdpSocket>,
    raeume: RoomDirectory,
}

impl RelayServer {
    /// Bindet den UDP-Socket
    pub async fn binden(config: RelayServerConfig, raeume: RoomDirectory) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!(addr = %config.bind_addr, "UDP Relay gebunden");

        Ok(Self {
            config,
            socket: Arc::new(socket),
            raeume,
        })
    }

    /// Gibt die lokale Bind-Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn raeume(&self) -> &RoomDirectory {
        &self.raeume
    }

    /// Startet die Empfangs-Loop (laeuft bis `shutdown_rx` true meldet)
    pub async fn empfangs_loop_starten(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        let mut pruefung = tokio::time::interval(self.config.pruef_intervall);
        pruefung.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!("Relay-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, absender)) => {
                            self.datagramm_verarbeiten(&buf[..len], absender).await;
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            // Kurze Pause um Busy-Loop bei persistentem Fehler zu vermeiden
                            tokio::time::sleep(Duration::from_millis(1)).await;
                        }
                    }
                }

                _ = pruefung.tick() => {
                    self.tick(Instant::now());
                }

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Relay: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Relay-Empfangs-Loop beendet");
    }

    /// Schliesst inaktive Raeume
    pub fn tick(&self, jetzt: Instant) -> usize {
        let geschlossen = self
            .raeume
            .inaktive_schliessen(self.config.raum_timeout, jetzt);
        geschlossen.len()
    }

    // -----------------------------------------------------------------------
    // Internes Datagramm-Processing
    // -----------------------------------------------------------------------

    async fn datagramm_verarbeiten(&self, daten: &[u8], absender: SocketAddr) {
        let datagramm = match Datagram::decode(daten) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(fehler = %e, absender = %absender, "Ungueltiges Datagramm verworfen");
                return;
            }
        };
        let header = datagramm.header;

        match header.message_type {
            MessageType::CsJoinRoom => self.beitritt(&datagramm, absender).await,
            MessageType::CsLeaveRoom => {
                self.raeume.verlassen(header.room_id, header.sender, absender);
            }
            _ => self.weiterleiten(&datagramm, Bytes::copy_from_slice(daten), absender).await,
        }
    }

    async fn beitritt(&self, datagramm: &Datagram, absender: SocketAddr) {
        let header = datagramm.header;

        let ergebnis = deserialize_body::<JoinRoomRequest>(&datagramm.nutzdaten)
            .map_err(RelayError::from)
            .and_then(|req| {
                if req.room_id != header.room_id.0 {
                    return Err(RelayError::RaumUnbekannt(header.room_id));
                }
                self.raeume
                    .beitreten(header.room_id, header.sender, absender)
            });

        let antwort = match ergebnis {
            Ok(e) => JoinRoomResponse {
                result: JoinResult::Joined as i32,
                player_index: e.player_index,
                random_seed: e.random_seed,
            },
            Err(e) => {
                tracing::debug!(
                    fehler = %e,
                    room = %header.room_id,
                    session = %header.sender,
                    absender = %absender,
                    "Raum-Beitritt abgelehnt"
                );
                JoinRoomResponse {
                    result: JoinResult::Failed as i32,
                    player_index: 0,
                    random_seed: 0,
                }
            }
        };

        let dg = Datagram::aus_nachricht(
            DatagramHeader::new(header.room_id, header.sender, MessageType::ScJoinRoom),
            &antwort,
        );
        self.senden(&dg.encode(), absender).await;
    }

    async fn weiterleiten(&self, datagramm: &Datagram, roh: Bytes, absender: SocketAddr) {
        let header = datagramm.header;
        let (handler, andere) = match self.raeume.ziele(header.room_id, header.sender, absender) {
            Ok(z) => z,
            Err(e) => {
                tracing::trace!(fehler = %e, absender = %absender, "Datagramm ohne Anmeldung verworfen");
                return;
            }
        };

        let kontext = RaumKontext {
            room_id: header.room_id,
            absender: header.sender,
            andere: &andere,
        };
        for w in handler.datagramm(&kontext, datagramm, &roh) {
            self.senden(&w.daten, w.ziel).await;
        }
    }

    async fn senden(&self, daten: &[u8], ziel: SocketAddr) {
        match self.socket.send_to(daten, ziel).await {
            Ok(_) => {
                tracing::trace!(bytes = daten.len(), ziel = %ziel, "UDP-Datagramm gesendet");
            }
            Err(e) => {
                tracing::warn!(fehler = %e, ziel = %ziel, "UDP-Sendefehler");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
