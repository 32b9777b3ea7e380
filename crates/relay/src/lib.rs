//! matchhall-relay – UDP-Relay (Data-Plane)
//!
//! Ein einzelner UDP-Socket nimmt alle Datagramme an und verteilt sie
//! anhand der Raum-Id im Header. Raeume entstehen aus `match.found` auf dem
//! Event-Bus; Spieler melden sich per `CsJoinRoom` an und erhalten ihren
//! Spieler-Index und den gemeinsamen Zufalls-Seed des Raums.

pub mod error;
pub mod handler;
pub mod room;
pub mod udp;

pub use error::{RelayError, RelayResult};
pub use handler::{ForwardingRoom, HandlerFabrik, RaumKontext, RoomHandler, Weiterleitung};
pub use room::{JoinErgebnis, RoomDirectory};
pub use udp::{RelayServer, RelayServerConfig};
