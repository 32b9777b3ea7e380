//! Session und Transport-Handle

use matchhall_core::{ConnectionId, RoomId, SessionId};
use matchhall_protocol::Envelope;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// TransportHandle
// ---------------------------------------------------------------------------

/// Nicht-besitzendes Handle auf die Send-Queue einer TCP-Verbindung
///
/// Das Verwerfen oder Ersetzen des Handles schliesst die Verbindung nicht;
/// die Verbindung endet durch ihren eigenen Loop, den `trennen` anstossen kann.
#[derive(Clone, Debug)]
pub struct TransportHandle {
    pub verbindung: ConnectionId,
    tx: mpsc::Sender<Envelope>,
    trennung: Arc<watch::Sender<bool>>,
}

impl TransportHandle {
    pub fn neu(verbindung: ConnectionId, tx: mpsc::Sender<Envelope>) -> Self {
        let (trennung, _) = watch::channel(false);
        Self {
            verbindung,
            tx,
            trennung: Arc::new(trennung),
        }
    }

    /// Signal fuer den Verbindungs-Loop; wechselt auf true bei `trennen`
    pub fn trenn_signal(&self) -> watch::Receiver<bool> {
        self.trennung.subscribe()
    }

    /// Fordert die Verbindung auf, sich zu beenden
    pub fn trennen(&self) {
        self.trennung.send_replace(true);
    }

    /// Sendet ein Envelope nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(env)) => {
                tracing::warn!(
                    verbindung = %self.verbindung,
                    typ = %env.message_type,
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.verbindung, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Wie `senden`, trennt aber die Verbindung wenn die Queue voll ist
    ///
    /// Fuer Nachrichten, deren Verlust der Client nicht bemerken wuerde.
    pub fn senden_oder_trennen(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(env)) => {
                tracing::warn!(
                    verbindung = %self.verbindung,
                    typ = %env.message_type,
                    "Send-Queue voll – Verbindung wird getrennt"
                );
                self.trennen();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// true solange der Lese-Loop der Verbindung laeuft
    pub fn ist_offen(&self) -> bool {
        !self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SessionZustand {
    room_id: Option<RoomId>,
    online: bool,
    transport: Option<TransportHandle>,
}

/// Ein eingeloggter Spieler
///
/// Id und Account sind unveraenderlich; Raum, Online-Status und Transport
/// liegen hinter einem kurzen `RwLock`.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    account: String,
    zustand: RwLock<SessionZustand>,
}

impl Session {
    pub fn neu(id: SessionId, account: impl Into<String>) -> Self {
        Self {
            id,
            account: account.into(),
            zustand: RwLock::new(SessionZustand::default()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.zustand.read().room_id
    }

    pub fn raum_setzen(&self, room_id: Option<RoomId>) {
        self.zustand.write().room_id = room_id;
    }

    pub fn ist_online(&self) -> bool {
        self.zustand.read().online
    }

    pub fn online_setzen(&self, online: bool) {
        self.zustand.write().online = online;
    }

    /// Bindet nur, wenn keine andere offene Verbindung die Session haelt
    ///
    /// Pruefung und Bindung laufen unter demselben Schreib-Lock. Bei Erfolg
    /// ist die Session online, sonst kommt das aktive Handle zurueck.
    pub fn transport_binden_wenn_frei(&self, handle: TransportHandle) -> Result<(), TransportHandle> {
        let mut zustand = self.zustand.write();
        if let Some(aktiv) = &zustand.transport {
            if aktiv.verbindung != handle.verbindung && aktiv.ist_offen() {
                return Err(aktiv.clone());
            }
        }
        zustand.transport = Some(handle);
        zustand.online = true;
        Ok(())
    }

    /// Loest den Transport, aber nur wenn er noch zu `verbindung` gehoert
    ///
    /// Eine neuere Verbindung desselben Accounts bleibt so unberuehrt.
    pub fn transport_loesen(&self, verbindung: ConnectionId) -> bool {
        let mut zustand = self.zustand.write();
        let eigene = zustand
            .transport
            .as_ref()
            .is_some_and(|t| t.verbindung == verbindung);
        if !eigene {
            return false;
        }
        zustand.transport = None;
        zustand.online = false;
        true
    }

    pub fn transport(&self) -> Option<TransportHandle> {
        self.zustand.read().transport.clone()
    }

    /// Sendet ueber den gebundenen Transport
    ///
    /// `false` wenn kein Transport gebunden ist oder die Queue nicht annimmt.
    pub fn senden(&self, envelope: Envelope) -> bool {
        // Handle klonen, damit der Lock nicht waehrend des Sendens gehalten wird
        match self.transport() {
            Some(t) => t.senden(envelope),
            None => {
                tracing::debug!(session = %self.id, "Kein Transport gebunden – Nachricht verworfen");
                false
            }
        }
    }

    /// Sendet ueber den gebundenen Transport, volle Queue trennt die Verbindung
    pub fn senden_oder_trennen(&self, envelope: Envelope) -> bool {
        match self.transport() {
            Some(t) => t.senden_oder_trennen(envelope),
            None => false,
        }
    }
}
