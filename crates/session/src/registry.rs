//! Session-Registry – Account- und Id-Index aller Sessions
//!
//! ## Invariante
//!
//! Fuer jeden Account existiert hoechstens ein registriertes `Arc<Session>`.
//! `get_or_create` haelt den Shard-Lock des Account-Index ueber Pruefen UND
//! Einfuegen (DashMap-Entry-API); ein "erst suchen, dann einfuegen" mit
//! Luecke dazwischen gibt es nicht.
//!
//! ```text
//! get_or_create("alice")
//!   nach_account.entry("alice")   <- Shard-Lock
//!     Occupied -> vorhandene Session
//!     Vacant   -> neue Id, nach_id.insert, nach_account.insert
//!   Shard-Lock frei
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use matchhall_core::{EventBus, IdGenerator, SessionId, SubscriberId};

use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// Thread-sichere Registry aller Sessions
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    nach_account: DashMap<String, Arc<Session>>,
    nach_id: DashMap<SessionId, Arc<Session>>,
    ids: Arc<IdGenerator>,
    bus: EventBus,
}

impl SessionRegistry {
    pub fn neu(ids: Arc<IdGenerator>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                nach_account: DashMap::new(),
                nach_id: DashMap::new(),
                ids,
                bus,
            }),
        }
    }

    /// Liefert die Session eines Accounts oder legt sie an
    ///
    /// Nebenlaeufige Aufrufe fuer denselben Account erhalten dasselbe `Arc`.
    ///
    /// # Fehler
    /// - `DuplicateSession` wenn der Id-Index bereits eine andere Session
    ///   unter der neuen Id enthaelt (darf nie passieren)
    pub fn get_or_create(&self, account: &str) -> SessionResult<Arc<Session>> {
        // Schneller Pfad ohne Schreib-Lock
        if let Some(session) = self.inner.nach_account.get(account) {
            return Ok(Arc::clone(&session));
        }

        match self.inner.nach_account.entry(account.to_string()) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(e) => {
                let id = SessionId(self.inner.ids.naechste());
                let session = Arc::new(Session::neu(id, account));

                if let Some(alt) = self.inner.nach_id.insert(id, Arc::clone(&session)) {
                    // Alten Eintrag wiederherstellen, Registry bleibt konsistent
                    self.inner.nach_id.insert(id, Arc::clone(&alt));
                    tracing::error!(
                        account,
                        vorhanden = %alt.id(),
                        vorhandener_account = alt.account(),
                        "Invariante verletzt: Session-Id doppelt vergeben"
                    );
                    return Err(SessionError::DuplicateSession {
                        account: account.to_string(),
                        vorhanden: alt.id(),
                        neu: id,
                    });
                }

                e.insert(Arc::clone(&session));
                tracing::info!(session = %id, account, "Session angelegt");
                Ok(session)
            }
        }
    }

    /// O(1)-Lookup nach Id
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.inner.nach_id.get(&id).map(|s| Arc::clone(&s))
    }

    pub fn get_by_account(&self, account: &str) -> Option<Arc<Session>> {
        self.inner.nach_account.get(account).map(|s| Arc::clone(&s))
    }

    /// Entfernt eine Session aus beiden Indizes
    ///
    /// Entfernt ausserdem alle Event-Bus-Listener der Session.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let session = self.get(id)?;

        // Account-Eintrag nur entfernen wenn er noch auf diese Session zeigt
        self.inner
            .nach_account
            .remove_if(session.account(), |_, s| s.id() == id);
        self.inner.nach_id.remove(&id);

        session.online_setzen(false);
        let listener = self
            .inner
            .bus
            .clear_all_event_register(SubscriberId::from(id));

        tracing::info!(
            session = %id,
            account = session.account(),
            listener,
            "Session entfernt"
        );
        Some(session)
    }

    /// Anzahl registrierter Sessions
    pub fn anzahl(&self) -> usize {
        self.inner.nach_id.len()
    }

    /// Anzahl Sessions mit Online-Flag
    pub fn online_anzahl(&self) -> usize {
        self.inner
            .nach_id
            .iter()
            .filter(|e| e.value().ist_online())
            .count()
    }

    /// Schnappschuss aller Sessions
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner
            .nach_id
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Prueft, dass beide Indizes dieselben Sessions enthalten
    ///
    /// # Fehler
    /// - `DuplicateSession` beim ersten Account, dessen Eintraege auseinanderlaufen
    pub fn konsistenz_pruefen(&self) -> SessionResult<()> {
        for eintrag in self.inner.nach_account.iter() {
            let session = eintrag.value();
            let im_index = self.get(session.id());
            match im_index {
                Some(s) if Arc::ptr_eq(&s, session) => {}
                Some(s) => {
                    tracing::error!(
                        account = session.account(),
                        vorhanden = %s.id(),
                        neu = %session.id(),
                        "Invariante verletzt: Indizes zeigen auf verschiedene Sessions"
                    );
                    return Err(SessionError::DuplicateSession {
                        account: session.account().to_string(),
                        vorhanden: s.id(),
                        neu: session.id(),
                    });
                }
                // Eintrag wird gerade von remove() abgebaut
                None => {}
            }
        }
        Ok(())
    }
}
