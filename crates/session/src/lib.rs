//! matchhall-session – Session-Registry
//!
//! Einzige Quelle fuer "wer ist als wer verbunden". Sessions werden ueber
//! den Account angelegt bzw. wiederverwendet und per `Arc` zwischen
//! TCP-Verbindung, Matchmaking und Relay geteilt.

pub mod error;
pub mod registry;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use registry::SessionRegistry;
pub use session::{Session, TransportHandle};
