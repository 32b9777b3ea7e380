//! Matchmaking-Koordinator
//!
//! ## Ablauf
//!
//! ```text
//! join(session)
//!   Lock Warteschlange
//!     Account schon drin?          -> false (kein zweites Ticket)
//!     Ticket hinten anhaengen
//!     solange len >= party_groesse:
//!       aelteste N Tickets entnehmen, Raum-Id ziehen, Relay anfragen
//!       kein Relay frei -> Tickets vorne zurueck, abbrechen
//!   Lock frei
//!   match.found / match.no_capacity auf dem Bus
//! ```
//!
//! Ticket-Zustaende: `Queued -> Matched` oder `Queued -> Withdrawn`
//! (per `leave` oder Ablauf in `tick`). Nach einem Match legt ein erneutes
//! `join` ein frisches Ticket an.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use matchhall_core::{topics, EventBus, IdGenerator, RoomId, TopicId};
use matchhall_session::Session;
use parking_lot::Mutex;

use crate::allocator::RelayAllocator;
use crate::error::{MatchmakingError, MatchmakingResult};
use crate::ticket::{AssignmentState, MatchAssignment, MatchMember, MatchTicket};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchmakingConfig {
    /// Spieler pro Raum
    pub party_groesse: usize,
    /// Maximale Wartezeit eines Tickets; `None` = unbegrenzt
    pub ticket_ablauf: Option<Duration>,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            party_groesse: 2,
            ticket_ablauf: None,
        }
    }
}

/// Ergebnis eines `tick`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub abgelaufen: usize,
    pub zuweisungen: usize,
}

/// Was unter dem Lock entschieden wurde und danach gemeldet wird
#[derive(Default)]
struct Bildung {
    zuweisungen: Vec<MatchAssignment>,
    ohne_kapazitaet: Option<usize>,
    abgelaufen: Vec<String>,
}

// ---------------------------------------------------------------------------
// MatchmakingCoordinator
// ---------------------------------------------------------------------------

/// Thread-sicherer Koordinator, Clone teilt den Zustand
#[derive(Clone)]
pub struct MatchmakingCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: MatchmakingConfig,
    warteschlange: Mutex<VecDeque<MatchTicket>>,
    /// Anzahl bisheriger `tick`-Aufrufe
    takt: AtomicU64,
    ids: Arc<IdGenerator>,
    allocator: Arc<dyn RelayAllocator>,
    bus: EventBus,
    topic_found: TopicId,
    topic_no_capacity: TopicId,
    topic_expired: TopicId,
}

impl MatchmakingCoordinator {
    /// # Fehler
    /// - `Konfiguration` bei einer Party-Groesse von 0
    pub fn neu(
        config: MatchmakingConfig,
        ids: Arc<IdGenerator>,
        allocator: Arc<dyn RelayAllocator>,
        bus: EventBus,
    ) -> MatchmakingResult<Self> {
        if config.party_groesse == 0 {
            return Err(MatchmakingError::Konfiguration(
                "party_groesse muss mindestens 1 sein".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                topic_found: bus.topic(topics::MATCH_FOUND),
                topic_no_capacity: bus.topic(topics::MATCH_NO_CAPACITY),
                topic_expired: bus.topic(topics::MATCH_EXPIRED),
                config,
                warteschlange: Mutex::new(VecDeque::new()),
                takt: AtomicU64::new(0),
                ids,
                allocator,
                bus,
            }),
        })
    }

    pub fn config(&self) -> &MatchmakingConfig {
        &self.inner.config
    }

    /// Reiht die Session ein
    ///
    /// Gibt `false` zurueck wenn der Account bereits wartet; es entsteht
    /// kein zweites Ticket.
    pub fn join(&self, session: Arc<Session>) -> bool {
        let bildung = {
            let mut schlange = self.inner.warteschlange.lock();
            if schlange.iter().any(|t| t.account == session.account()) {
                return false;
            }
            tracing::debug!(
                session = %session.id(),
                account = session.account(),
                wartend = schlange.len() + 1,
                "Ticket eingereiht"
            );
            schlange.push_back(MatchTicket::neu(session, Instant::now()));
            self.gruppen_bilden(&mut schlange)
        };
        self.melden(bildung);
        true
    }

    /// Nimmt das Ticket eines Accounts aus der Warteschlange
    ///
    /// No-op (Ergebnis `false`) wenn kein Ticket wartet.
    pub fn leave(&self, account: &str) -> bool {
        let mut schlange = self.inner.warteschlange.lock();
        let vorher = schlange.len();
        schlange.retain(|t| t.account != account);
        let entfernt = schlange.len() < vorher;
        if entfernt {
            tracing::debug!(account, "Ticket zurueckgezogen");
        }
        entfernt
    }

    /// Entfernt abgelaufene Tickets und versucht erneut Gruppen zu bilden
    ///
    /// Wird extern periodisch aufgerufen; ohne Aufruf laeuft nichts ab.
    pub fn tick(&self, jetzt: Instant) -> TickReport {
        self.inner.takt.fetch_add(1, Ordering::Relaxed);
        let bildung = {
            let mut schlange = self.inner.warteschlange.lock();
            let mut abgelaufen = Vec::new();
            if let Some(ablauf) = self.inner.config.ticket_ablauf {
                schlange.retain(|t| {
                    let lebt = jetzt.saturating_duration_since(t.joined_at) < ablauf;
                    if !lebt {
                        abgelaufen.push(t.account.clone());
                    }
                    lebt
                });
            }
            let mut bildung = self.gruppen_bilden(&mut schlange);
            bildung.abgelaufen = abgelaufen;
            bildung
        };

        let report = TickReport {
            abgelaufen: bildung.abgelaufen.len(),
            zuweisungen: bildung.zuweisungen.len(),
        };
        self.melden(bildung);
        report
    }

    /// Gibt den Relay-Platz eines geschlossenen Raums frei und versucht
    /// wartende Gruppen zu bilden
    pub fn release_room(&self, room_id: RoomId) {
        self.inner.allocator.release(room_id);
        let bildung = {
            let mut schlange = self.inner.warteschlange.lock();
            self.gruppen_bilden(&mut schlange)
        };
        self.melden(bildung);
    }

    /// Stand des Tick-Zaehlers, wird in jede Zuweisung uebernommen
    pub fn aktueller_tick(&self) -> u64 {
        self.inner.takt.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.warteschlange.lock().len()
    }

    pub fn ist_in_warteschlange(&self, account: &str) -> bool {
        self.inner
            .warteschlange
            .lock()
            .iter()
            .any(|t| t.account == account)
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Bildet Gruppen, solange genug Tickets warten. Laeuft unter dem Lock.
    fn gruppen_bilden(&self, schlange: &mut VecDeque<MatchTicket>) -> Bildung {
        let party = self.inner.config.party_groesse;
        let mut bildung = Bildung::default();
        let tick = self.aktueller_tick();

        while schlange.len() >= party {
            let gruppe: Vec<MatchTicket> = schlange.drain(..party).collect();
            let room_id = raum_id(self.inner.ids.naechste());

            match self.inner.allocator.allocate(room_id, party) {
                Ok(relay) => {
                    let members = gruppe
                        .iter()
                        .enumerate()
                        .map(|(i, t)| MatchMember {
                            session_id: t.session.id(),
                            account: t.account.clone(),
                            player_index: i as i32 + 1,
                        })
                        .collect();
                    bildung.zuweisungen.push(MatchAssignment {
                        room_id,
                        relay,
                        state: AssignmentState::Assigned,
                        tick,
                        members,
                    });
                }
                Err(MatchmakingError::NoCapacity { gruppe: n }) => {
                    // Gruppe in Originalreihenfolge vorne wieder einsetzen
                    for ticket in gruppe.into_iter().rev() {
                        schlange.push_front(ticket);
                    }
                    bildung.ohne_kapazitaet = Some(n);
                    break;
                }
                Err(e) => {
                    for ticket in gruppe.into_iter().rev() {
                        schlange.push_front(ticket);
                    }
                    tracing::error!(fehler = %e, "Relay-Zuweisung fehlgeschlagen");
                    break;
                }
            }
        }

        bildung
    }

    /// Verteilt Ergebnisse auf dem Bus; nie unter dem Warteschlangen-Lock
    fn melden(&self, bildung: Bildung) {
        let bus = &self.inner.bus;

        for account in &bildung.abgelaufen {
            tracing::info!(account = %account, "Ticket abgelaufen");
            bus.push1(self.inner.topic_expired, account);
        }

        if let Some(gruppe) = bildung.ohne_kapazitaet {
            let fehler = MatchmakingError::NoCapacity { gruppe };
            tracing::warn!(
                fehler = %fehler,
                wartend = self.queue_len(),
                "Gruppe gebildet, aber kein Relay frei"
            );
            bus.push1(self.inner.topic_no_capacity, &gruppe);
        }

        for zuweisung in &bildung.zuweisungen {
            tracing::info!(
                room = %zuweisung.room_id,
                relay = %zuweisung.relay,
                spieler = zuweisung.members.len(),
                "Match gebildet"
            );
            let report = bus.push1(self.inner.topic_found, zuweisung);
            if !report.hat_empfaenger() {
                tracing::warn!(room = %zuweisung.room_id, "Match ohne Empfaenger zugestellt");
            }
        }
    }
}

/// Raum-Ids sind auf dem Draht 31 Bit breit
fn raum_id(roh: i64) -> RoomId {
    RoomId((roh & 0x7FFF_FFFF) as i32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{RelayEndpoint, StaticRelayPool};
    use matchhall_core::{SessionId, SubscriberId};

    struct Aufbau {
        coord: MatchmakingCoordinator,
        pool: Arc<StaticRelayPool>,
        gefunden: Arc<Mutex<Vec<MatchAssignment>>>,
        bus: EventBus,
    }

    fn aufbau(party: usize, kapazitaet: usize, ablauf: Option<Duration>) -> Aufbau {
        let bus = EventBus::neu();
        let pool = Arc::new(StaticRelayPool::einzeln(
            RelayEndpoint {
                adresse: "127.0.0.1".into(),
                port: 12900,
            },
            kapazitaet,
        ));
        let coord = MatchmakingCoordinator::neu(
            MatchmakingConfig {
                party_groesse: party,
                ticket_ablauf: ablauf,
            },
            Arc::new(IdGenerator::neu()),
            pool.clone(),
            bus.clone(),
        )
        .unwrap();

        let gefunden = Arc::new(Mutex::new(Vec::new()));
        let g = Arc::clone(&gefunden);
        bus.add_listener1(
            SubscriberId(0),
            bus.topic(topics::MATCH_FOUND),
            move |a: &MatchAssignment| {
                g.lock().push(a.clone());
                Ok(())
            },
        );

        Aufbau {
            coord,
            pool,
            gefunden,
            bus,
        }
    }

    fn session(id: i64, account: &str) -> Arc<Session> {
        Arc::new(Session::neu(SessionId(id), account))
    }

    #[test]
    fn party_groesse_null_ist_ungueltig() {
        let result = MatchmakingCoordinator::neu(
            MatchmakingConfig {
                party_groesse: 0,
                ticket_ablauf: None,
            },
            Arc::new(IdGenerator::neu()),
            Arc::new(StaticRelayPool::einzeln(
                RelayEndpoint {
                    adresse: "x".into(),
                    port: 1,
                },
                1,
            )),
            EventBus::neu(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn alice_und_bob_ergeben_ein_match() {
        let a = aufbau(2, 4, None);
        assert!(a.coord.join(session(1, "alice")));
        assert!(a.gefunden.lock().is_empty());

        assert!(a.coord.join(session(2, "bob")));
        let gefunden = a.gefunden.lock();
        assert_eq!(gefunden.len(), 1);

        let m = &gefunden[0];
        assert_eq!(m.state, AssignmentState::Assigned);
        assert_eq!(m.relay.port, 12900);
        let accounts: Vec<_> = m.members.iter().map(|x| x.account.as_str()).collect();
        assert_eq!(accounts, vec!["alice", "bob"]);
        assert_eq!(m.members[0].player_index, 1);
        assert_eq!(m.members[1].player_index, 2);
        assert!(m.mitglied(SessionId(2)).is_some());
        assert_eq!(a.coord.queue_len(), 0);
    }

    #[test]
    fn doppeltes_join_ist_no_op() {
        let a = aufbau(3, 4, None);
        assert!(a.coord.join(session(1, "alice")));
        assert!(!a.coord.join(session(1, "alice")));
        assert_eq!(a.coord.queue_len(), 1);
    }

    #[test]
    fn nie_zwei_tickets_pro_account() {
        let a = aufbau(5, 4, None);
        let folge = [
            ("join", "a"),
            ("join", "b"),
            ("join", "a"),
            ("leave", "a"),
            ("join", "a"),
            ("join", "a"),
            ("leave", "c"),
            ("join", "c"),
            ("join", "b"),
        ];
        for (i, (op, account)) in folge.iter().enumerate() {
            match *op {
                "join" => {
                    a.coord.join(session(i as i64, account));
                }
                _ => {
                    a.coord.leave(account);
                }
            }
            let schlange = a.coord.inner.warteschlange.lock();
            let mut accounts: Vec<_> = schlange.iter().map(|t| t.account.clone()).collect();
            let len = accounts.len();
            accounts.sort();
            accounts.dedup();
            assert_eq!(accounts.len(), len, "Doppeltes Ticket nach Schritt {}", i);
        }
        assert_eq!(a.coord.queue_len(), 3);
    }

    #[test]
    fn nebenlaeufige_joins_ohne_duplikate() {
        let a = aufbau(1000, 4, None);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let coord = a.coord.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|i| coord.join(session(t * 100 + i, &format!("spieler{}", i))))
                        .count()
                })
            })
            .collect();
        let erfolgreich: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(erfolgreich, 20);
        assert_eq!(a.coord.queue_len(), 20);
    }

    #[test]
    fn leave_entfernt_nur_wartende() {
        let a = aufbau(2, 4, None);
        a.coord.join(session(1, "alice"));
        assert!(a.coord.leave("alice"));
        assert!(!a.coord.leave("alice"));
        assert!(!a.coord.ist_in_warteschlange("alice"));
    }

    #[test]
    fn fifo_reihenfolge_und_rest_wartet() {
        let a = aufbau(2, 4, None);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            a.coord.join(session(i as i64, name));
        }
        let gefunden = a.gefunden.lock();
        assert_eq!(gefunden.len(), 1);
        assert_eq!(gefunden[0].members[0].account, "a");
        assert_eq!(gefunden[0].members[1].account, "b");
        assert!(a.coord.ist_in_warteschlange("c"));
    }

    #[test]
    fn ohne_kapazitaet_bleiben_tickets_wartend() {
        let a = aufbau(2, 0, None);
        let keine = Arc::new(Mutex::new(Vec::new()));
        let k = Arc::clone(&keine);
        a.bus.add_listener1(
            SubscriberId(0),
            a.bus.topic(topics::MATCH_NO_CAPACITY),
            move |n: &usize| {
                k.lock().push(*n);
                Ok(())
            },
        );

        a.coord.join(session(1, "alice"));
        a.coord.join(session(2, "bob"));

        assert!(a.gefunden.lock().is_empty());
        assert_eq!(*keine.lock(), vec![2]);
        assert_eq!(a.coord.queue_len(), 2);

        // Reihenfolge bleibt erhalten
        let schlange = a.coord.inner.warteschlange.lock();
        assert_eq!(schlange[0].account, "alice");
        assert_eq!(schlange[1].account, "bob");
    }

    #[test]
    fn release_room_bildet_wartende_gruppe() {
        let a = aufbau(2, 1, None);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            a.coord.join(session(i as i64, name));
        }
        assert_eq!(a.gefunden.lock().len(), 1);
        assert_eq!(a.coord.queue_len(), 2);

        let raum = a.gefunden.lock()[0].room_id;
        a.coord.release_room(raum);

        let gefunden = a.gefunden.lock();
        assert_eq!(gefunden.len(), 2);
        assert_eq!(gefunden[1].members[0].account, "c");
        assert_eq!(a.pool.belegte_raeume(), 1);
    }

    #[test]
    fn tick_entfernt_abgelaufene_tickets() {
        let a = aufbau(3, 4, Some(Duration::from_secs(10)));
        let abgelaufen = Arc::new(Mutex::new(Vec::new()));
        let ab = Arc::clone(&abgelaufen);
        a.bus.add_listener1(
            SubscriberId(0),
            a.bus.topic(topics::MATCH_EXPIRED),
            move |account: &String| {
                ab.lock().push(account.clone());
                Ok(())
            },
        );

        a.coord.join(session(1, "alice"));
        a.coord.join(session(2, "bob"));

        let report = a.coord.tick(Instant::now());
        assert_eq!(report, TickReport::default());

        let report = a.coord.tick(Instant::now() + Duration::from_secs(11));
        assert_eq!(report.abgelaufen, 2);
        assert_eq!(a.coord.queue_len(), 0);
        assert_eq!(*abgelaufen.lock(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn tick_ohne_ablauf_behaelt_tickets() {
        let a = aufbau(3, 4, None);
        a.coord.join(session(1, "alice"));
        let report = a.coord.tick(Instant::now() + Duration::from_secs(3600));
        assert_eq!(report.abgelaufen, 0);
        assert_eq!(a.coord.queue_len(), 1);
    }

    #[test]
    fn zuweisung_traegt_tick_stand() {
        let a = aufbau(2, 4, None);
        assert_eq!(a.coord.aktueller_tick(), 0);
        a.coord.join(session(1, "alice"));
        a.coord.tick(Instant::now());
        a.coord.tick(Instant::now());
        assert_eq!(a.coord.aktueller_tick(), 2);

        a.coord.join(session(2, "bob"));
        assert_eq!(a.gefunden.lock()[0].tick, 2);
    }

    #[test]
    fn erneutes_join_nach_match() {
        let a = aufbau(2, 4, None);
        let alice = session(1, "alice");
        a.coord.join(Arc::clone(&alice));
        a.coord.join(session(2, "bob"));
        assert!(a.coord.join(alice));
        assert_eq!(a.coord.queue_len(), 1);
    }

    #[test]
    fn raum_id_bleibt_positiv() {
        assert_eq!(raum_id(1), RoomId(1));
        assert!(raum_id(i64::MAX).0 >= 0);
    }
}
