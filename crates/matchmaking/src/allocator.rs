//! Relay-Zuweisung
//!
//! Der Koordinator fragt fuer jede neue Gruppe einen Endpunkt an. Die
//! mitgelieferte Strategie ist ein statischer Pool mit fester Raum-Kapazitaet
//! pro Endpunkt; gewaehlt wird der Endpunkt mit den meisten freien Plaetzen.

use std::collections::HashMap;

use matchhall_core::RoomId;
use parking_lot::Mutex;

use crate::error::{MatchmakingError, MatchmakingResult};

/// Adresse, unter der Clients das UDP-Relay erreichen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayEndpoint {
    pub adresse: String,
    pub port: u16,
}

impl std::fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.adresse, self.port)
    }
}

/// Vergibt Relay-Endpunkte an neue Raeume
pub trait RelayAllocator: Send + Sync {
    /// Reserviert einen Platz fuer `room_id`
    ///
    /// # Fehler
    /// - `NoCapacity` wenn kein Endpunkt frei ist
    fn allocate(&self, room_id: RoomId, gruppe: usize) -> MatchmakingResult<RelayEndpoint>;

    /// Gibt den Platz eines geschlossenen Raums frei; unbekannte Raeume sind ein No-op
    fn release(&self, room_id: RoomId);
}

// ---------------------------------------------------------------------------
// StaticRelayPool
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PoolEintrag {
    endpunkt: RelayEndpoint,
    kapazitaet: usize,
    belegt: usize,
}

/// Fest konfigurierte Relay-Endpunkte mit Raum-Kapazitaet
#[derive(Debug)]
pub struct StaticRelayPool {
    zustand: Mutex<PoolZustand>,
}

#[derive(Debug)]
struct PoolZustand {
    eintraege: Vec<PoolEintrag>,
    /// Raum -> Index in `eintraege`
    raeume: HashMap<RoomId, usize>,
}

impl StaticRelayPool {
    /// Erstellt einen Pool aus `(Endpunkt, Kapazitaet)`-Paaren
    ///
    /// # Fehler
    /// - `Konfiguration` wenn die Liste leer ist
    pub fn neu(endpunkte: Vec<(RelayEndpoint, usize)>) -> MatchmakingResult<Self> {
        if endpunkte.is_empty() {
            return Err(MatchmakingError::Konfiguration(
                "mindestens ein Relay-Endpunkt erforderlich".into(),
            ));
        }
        let eintraege = endpunkte
            .into_iter()
            .map(|(endpunkt, kapazitaet)| PoolEintrag {
                endpunkt,
                kapazitaet,
                belegt: 0,
            })
            .collect();
        Ok(Self {
            zustand: Mutex::new(PoolZustand {
                eintraege,
                raeume: HashMap::new(),
            }),
        })
    }

    /// Ein einzelner Endpunkt
    pub fn einzeln(endpunkt: RelayEndpoint, kapazitaet: usize) -> Self {
        Self {
            zustand: Mutex::new(PoolZustand {
                eintraege: vec![PoolEintrag {
                    endpunkt,
                    kapazitaet,
                    belegt: 0,
                }],
                raeume: HashMap::new(),
            }),
        }
    }

    /// Summe der freien Raum-Plaetze ueber alle Endpunkte
    pub fn freie_plaetze(&self) -> usize {
        self.zustand
            .lock()
            .eintraege
            .iter()
            .map(|e| e.kapazitaet.saturating_sub(e.belegt))
            .sum()
    }

    pub fn belegte_raeume(&self) -> usize {
        self.zustand.lock().raeume.len()
    }
}

impl RelayAllocator for StaticRelayPool {
    fn allocate(&self, room_id: RoomId, gruppe: usize) -> MatchmakingResult<RelayEndpoint> {
        let mut zustand = self.zustand.lock();

        if let Some(&idx) = zustand.raeume.get(&room_id) {
            return Ok(zustand.eintraege[idx].endpunkt.clone());
        }

        let bester = zustand
            .eintraege
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.kapazitaet.saturating_sub(e.belegt)))
            .filter(|(_, frei)| *frei > 0)
            // Bei Gleichstand gewinnt der erste Endpunkt
            .fold(None, |best: Option<(usize, usize)>, (i, frei)| match best {
                Some((_, best_frei)) if best_frei >= frei => best,
                _ => Some((i, frei)),
            });

        let Some((idx, _)) = bester else {
            return Err(MatchmakingError::NoCapacity { gruppe });
        };

        zustand.eintraege[idx].belegt += 1;
        zustand.raeume.insert(room_id, idx);
        Ok(zustand.eintraege[idx].endpunkt.clone())
    }

    fn release(&self, room_id: RoomId) {
        let mut zustand = self.zustand.lock();
        if let Some(idx) = zustand.raeume.remove(&room_id) {
            let eintrag = &mut zustand.eintraege[idx];
            eintrag.belegt = eintrag.belegt.saturating_sub(1);
            tracing::debug!(room = %room_id, relay = %eintrag.endpunkt, "Relay-Platz freigegeben");
        }
    }
}
