//! Request-Kontext – was ein Handler ueber die Verbindung wissen darf
//!
//! Wird zusammen mit dem Envelope als erstes Argument auf den Bus gelegt.
//! Die Session-Zelle teilt sich der Kontext mit der `ClientConnection`,
//! damit ein Login-Handler die Verbindung an eine Session binden kann.

use std::net::SocketAddr;
use std::sync::Arc;

use matchhall_core::ConnectionId;
use matchhall_protocol::{Envelope, MessageType};
use matchhall_session::{Session, TransportHandle};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub verbindung: ConnectionId,
    pub peer_addr: SocketAddr,
    pub transport: TransportHandle,
    session: Arc<Mutex<Option<Arc<Session>>>>,
}

impl RequestContext {
    pub fn neu(verbindung: ConnectionId, peer_addr: SocketAddr, transport: TransportHandle) -> Self {
        Self {
            verbindung,
            peer_addr,
            transport,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Eingeloggte Session dieser Verbindung
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    pub fn session_setzen(&self, session: Option<Arc<Session>>) {
        *self.session.lock() = session;
    }

    /// Entnimmt die Session (beim Verbindungsende)
    pub fn session_nehmen(&self) -> Option<Arc<Session>> {
        self.session.lock().take()
    }

    /// Stellt eine Antwort in die Send-Queue der Verbindung
    pub fn antworten(&self, envelope: Envelope) -> bool {
        self.transport.senden(envelope)
    }

    /// Antwort ohne Body mit Fehlercode
    pub fn fehler(&self, typ: MessageType, error_code: u32) -> bool {
        self.antworten(Envelope::fehler(typ, error_code))
    }
}
