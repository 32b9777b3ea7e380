//! matchhall-matchmaking – Matchmaking-Koordinator
//!
//! Sammelt Spieler in einer FIFO-Warteschlange, bildet Gruppen fester
//! Groesse und weist jeder Gruppe einen Raum auf einem Relay zu. Ergebnisse
//! gehen ueber den Event-Bus (`match.found`), nie direkt auf einen Socket.

pub mod allocator;
pub mod coordinator;
pub mod error;
pub mod ticket;

pub use allocator::{RelayAllocator, RelayEndpoint, StaticRelayPool};
pub use coordinator::{MatchmakingConfig, MatchmakingCoordinator, TickReport};
pub use error::{MatchmakingError, MatchmakingResult};
pub use ticket::{AssignmentState, MatchAssignment, MatchMember, MatchTicket};
