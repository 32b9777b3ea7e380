//! Raum-Verzeichnis des Relays
//!
//! Raeume werden aus `match.found` angelegt und kennen ab dann ihre
//! erwarteten Mitglieder. Ein Spieler gilt als angemeldet, sobald er per
//! `CsJoinRoom` seine UDP-Adresse hinterlegt hat.
//!
//! ```text
//! match.found ──> raum_anlegen   (erwartet: alice#1, bob#2)
//! CsJoinRoom  ──> beitreten      (alice@1.2.3.4:5000)
//! Relay       ──> ziele          (an alle anderen angemeldeten)
//! CsLeaveRoom ──> verlassen      (letzter raus -> relay.room_closed)
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use matchhall_core::{topics, EventBus, RoomId, SessionId, SubscriberId, TopicId};
use matchhall_matchmaking::MatchAssignment;
use parking_lot::Mutex;

use crate::error::{RelayError, RelayResult};
use crate::handler::{ForwardingRoom, HandlerFabrik, RoomHandler};

// ---------------------------------------------------------------------------
// RelayRoom
// ---------------------------------------------------------------------------

struct RelayRoom {
    /// Session -> Spieler-Index aus der Zuweisung
    erwartet: HashMap<SessionId, i32>,
    /// Angemeldete Spieler und ihre Adresse
    angemeldet: HashMap<SessionId, SocketAddr>,
    random_seed: i32,
    handler: Arc<dyn RoomHandler>,
    letzte_aktivitaet: Instant,
}

/// Antwortdaten fuer einen erfolgreichen Beitritt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinErgebnis {
    pub player_index: i32,
    pub random_seed: i32,
}

// ---------------------------------------------------------------------------
// RoomDirectory
// ---------------------------------------------------------------------------

/// Thread-sicheres Raum-Verzeichnis, Clone teilt den Zustand
#[derive(Clone)]
pub struct RoomDirectory {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    raeume: DashMap<RoomId, Mutex<RelayRoom>>,
    fabrik: HandlerFabrik,
    bus: EventBus,
    topic_closed: TopicId,
}

impl RoomDirectory {
    /// Verzeichnis mit weiterleitenden Raeumen
    pub fn neu(bus: EventBus) -> Self {
        Self::mit_fabrik(bus, ForwardingRoom::fabrik())
    }

    pub fn mit_fabrik(bus: EventBus, fabrik: HandlerFabrik) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                raeume: DashMap::new(),
                fabrik,
                topic_closed: bus.topic(topics::RELAY_ROOM_CLOSED),
                bus,
            }),
        }
    }

    /// Abonniert `match.found`, damit neue Raeume automatisch entstehen
    pub fn an_bus_anbinden(&self) {
        let bus = &self.inner.bus;
        let verzeichnis = self.clone();
        bus.add_listener1(
            SubscriberId::RELAY,
            bus.topic(topics::MATCH_FOUND),
            move |zuweisung: &MatchAssignment| {
                verzeichnis.raum_anlegen(zuweisung);
                Ok(())
            },
        );
    }

    /// Legt einen Raum fuer eine Zuweisung an; vorhandene Raeume bleiben unveraendert
    pub fn raum_anlegen(&self, zuweisung: &MatchAssignment) {
        let room_id = zuweisung.room_id;
        if self.inner.raeume.contains_key(&room_id) {
            tracing::warn!(room = %room_id, "Raum existiert bereits");
            return;
        }
        let raum = RelayRoom {
            erwartet: zuweisung
                .members
                .iter()
                .map(|m| (m.session_id, m.player_index))
                .collect(),
            angemeldet: HashMap::new(),
            random_seed: rand::random::<i32>(),
            handler: (self.inner.fabrik)(zuweisung),
            letzte_aktivitaet: Instant::now(),
        };
        self.inner.raeume.entry(room_id).or_insert(Mutex::new(raum));
        tracing::info!(
            room = %room_id,
            spieler = zuweisung.members.len(),
            "Relay-Raum angelegt"
        );
    }

    /// Hinterlegt die Adresse eines Spielers
    ///
    /// Erneutes Beitreten von derselben Adresse ist idempotent. Ein Platz
    /// wechselt die Adresse erst, nachdem er per `verlassen` frei wurde.
    ///
    /// # Fehler
    /// - `RaumUnbekannt` wenn kein Raum mit dieser Id existiert
    /// - `KeinMitglied` wenn die Session nicht zur Zuweisung gehoert
    /// - `AdresseBelegt` wenn der Platz von einer anderen Adresse gehalten wird
    pub fn beitreten(
        &self,
        room_id: RoomId,
        session: SessionId,
        adresse: SocketAddr,
    ) -> RelayResult<JoinErgebnis> {
        let eintrag = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelayError::RaumUnbekannt(room_id))?;
        let mut raum = eintrag.lock();

        let player_index = *raum
            .erwartet
            .get(&session)
            .ok_or(RelayError::KeinMitglied {
                room: room_id,
                session,
            })?;

        if let Some(bisher) = raum.angemeldet.get(&session) {
            if *bisher != adresse {
                return Err(RelayError::AdresseBelegt {
                    room: room_id,
                    session,
                    adresse: *bisher,
                });
            }
        }

        raum.angemeldet.insert(session, adresse);
        raum.letzte_aktivitaet = Instant::now();
        tracing::debug!(room = %room_id, session = %session, adresse = %adresse, player_index, "Raum beigetreten");

        Ok(JoinErgebnis {
            player_index,
            random_seed: raum.random_seed,
        })
    }

    /// Meldet einen Spieler ab; der letzte schliesst den Raum
    ///
    /// Nur die bei `beitreten` hinterlegte Adresse darf abmelden. Gibt
    /// `true` zurueck wenn der Raum dadurch geschlossen wurde.
    pub fn verlassen(&self, room_id: RoomId, session: SessionId, adresse: SocketAddr) -> bool {
        let leer = match self.inner.raeume.get(&room_id) {
            Some(eintrag) => {
                let mut raum = eintrag.lock();
                if raum.angemeldet.get(&session) != Some(&adresse) {
                    tracing::debug!(room = %room_id, session = %session, adresse = %adresse, "Abmeldung von fremder Adresse verworfen");
                    return false;
                }
                raum.angemeldet.remove(&session);
                raum.letzte_aktivitaet = Instant::now();
                raum.angemeldet.is_empty()
            }
            None => return false,
        };
        if leer {
            self.raum_schliessen(room_id, "alle Spieler gegangen");
        }
        leer
    }

    /// Prueft den Absender und liefert Handler und Ziel-Adressen
    ///
    /// # Fehler
    /// - `RaumUnbekannt` / `NichtAngemeldet` wenn der Absender nicht unter
    ///   dieser Adresse angemeldet ist
    pub fn ziele(
        &self,
        room_id: RoomId,
        session: SessionId,
        adresse: SocketAddr,
    ) -> RelayResult<(Arc<dyn RoomHandler>, Vec<SocketAddr>)> {
        let eintrag = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelayError::RaumUnbekannt(room_id))?;
        let mut raum = eintrag.lock();

        if raum.angemeldet.get(&session) != Some(&adresse) {
            return Err(RelayError::NichtAngemeldet {
                room: room_id,
                session,
            });
        }
        raum.letzte_aktivitaet = Instant::now();

        let andere = raum
            .angemeldet
            .iter()
            .filter(|(id, _)| **id != session)
            .map(|(_, addr)| *addr)
            .collect();
        Ok((Arc::clone(&raum.handler), andere))
    }

    /// Entfernt einen Raum und meldet `relay.room_closed`
    pub fn raum_schliessen(&self, room_id: RoomId, grund: &str) -> bool {
        if self.inner.raeume.remove(&room_id).is_none() {
            return false;
        }
        tracing::info!(room = %room_id, grund, "Relay-Raum geschlossen");
        self.inner.bus.push1(self.inner.topic_closed, &room_id);
        true
    }

    /// Schliesst Raeume ohne Aktivitaet seit `timeout`
    pub fn inaktive_schliessen(&self, timeout: Duration, jetzt: Instant) -> Vec<RoomId> {
        let inaktiv: Vec<RoomId> = self
            .inner
            .raeume
            .iter()
            .filter(|e| jetzt.saturating_duration_since(e.value().lock().letzte_aktivitaet) > timeout)
            .map(|e| *e.key())
            .collect();

        for room_id in &inaktiv {
            self.raum_schliessen(*room_id, "Zeitlimit ohne Aktivitaet");
        }
        inaktiv
    }

    pub fn anzahl(&self) -> usize {
        self.inner.raeume.len()
    }

    pub fn existiert(&self, room_id: RoomId) -> bool {
        self.inner.raeume.contains_key(&room_id)
    }

    /// Anzahl angemeldeter Spieler eines Raums
    pub fn angemeldet(&self, room_id: RoomId) -> usize {
        self.inner
            .raeume
            .get(&room_id)
            .map(|r| r.lock().angemeldet.len())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
