//! matchhall-core – Gemeinsame Typen, Id-Generator und Event-Bus
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Matchhall-Crates gemeinsam genutzt werden: typisierte Ids, den
//! prozessweiten Id-Generator und den topic-basierten Event-Bus.

pub mod error;
pub mod event;
pub mod id;
pub mod topics;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{ListenerFault, MatchhallError, Result};
pub use event::{EventBus, FaultSink, PushReport, TracingFaultSink};
pub use id::IdGenerator;
pub use types::{ConnectionId, RoomId, SessionId, SubscriberId, TopicId};
