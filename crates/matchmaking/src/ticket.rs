//! Tickets und Zuweisungen

use std::sync::Arc;
use std::time::Instant;

use matchhall_core::{RoomId, SessionId};
use matchhall_session::Session;

use crate::allocator::RelayEndpoint;

/// Wartender Matchmaking-Wunsch eines Accounts
///
/// Lebt nur in der Warteschlange des Koordinators; hoechstens eins pro Account.
#[derive(Debug, Clone)]
pub struct MatchTicket {
    pub account: String,
    pub session: Arc<Session>,
    pub joined_at: Instant,
}

impl MatchTicket {
    pub fn neu(session: Arc<Session>, joined_at: Instant) -> Self {
        Self {
            account: session.account().to_string(),
            session,
            joined_at,
        }
    }
}

/// Zustand eines Match-Wunschs aus Sicht des Clients
///
/// `Pending` solange das Ticket wartet, `Failed` nach Ablauf.
/// `match.found` traegt immer `Assigned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentState {
    Pending,
    Assigned,
    Failed,
}

/// Ein Spieler innerhalb einer Zuweisung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchMember {
    pub session_id: SessionId,
    pub account: String,
    /// 1-basiert, in Reihenfolge des Beitritts zur Warteschlange
    pub player_index: i32,
}

/// Ergebnis einer Gruppenbildung, wird ueber `match.found` verteilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub room_id: RoomId,
    pub relay: RelayEndpoint,
    pub state: AssignmentState,
    /// Tick-Zaehler des Koordinators bei der Gruppenbildung
    pub tick: u64,
    pub members: Vec<MatchMember>,
}

impl MatchAssignment {
    /// Eintrag einer bestimmten Session, falls sie Teil der Gruppe ist
    pub fn mitglied(&self, session_id: SessionId) -> Option<&MatchMember> {
        self.members.iter().find(|m| m.session_id == session_id)
    }
}
