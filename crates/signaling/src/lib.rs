//! matchhall-signaling – TCP Control-Plane
//!
//! Akzeptiert TCP-Verbindungen, dekodiert Frames mit dem `FrameCodec` und
//! veroeffentlicht pro Nachrichtentyp ein Topic auf dem Event-Bus. Die
//! Handler fuer Login, Matchmaking und Heartbeat haengen als Listener am
//! Bus und antworten ueber das Transport-Handle der Verbindung.

pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod server_state;
pub mod tcp;

pub use connection::ClientConnection;
pub use context::RequestContext;
pub use dispatcher::MessageDispatcher;
pub use error::SignalingError;
pub use server_state::{SignalingConfig, SignalingState, SignalingStatistik};
pub use tcp::SignalingServer;
