//! Gemeinsame Identifikationstypen fuer Matchhall
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Die Zahlenwerte
//! stammen aus dem [`IdGenerator`](crate::id::IdGenerator) bzw. fuer Topics
//! aus dem Namens-Hash des Event-Bus.

use serde::{Deserialize, Serialize};

macro_rules! id_typ {
    ($(#[$meta:meta])* $name:ident($inner:ty), $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl $name {
            /// Gibt den inneren Zahlenwert zurueck
            pub fn inner(&self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }
    };
}

id_typ!(
    /// Eindeutige Session-ID (eine pro eingeloggtem Account)
    SessionId(i64),
    "session"
);

id_typ!(
    /// Raum-ID auf dem UDP-Relay
    ///
    /// Auf dem Draht 32 Bit breit, daher `i32`.
    RoomId(i32),
    "room"
);

id_typ!(
    /// Besitzer von Event-Bus-Listenern
    SubscriberId(i64),
    "sub"
);

id_typ!(
    /// Stabile 64-Bit Topic-ID, aus dem Topic-Namen abgeleitet
    TopicId(i64),
    "topic"
);

id_typ!(
    /// Laufende Nummer einer TCP-Verbindung
    ConnectionId(i64),
    "conn"
);

impl SubscriberId {
    /// System-Listener der TCP-Signalisierung
    pub const SIGNALING: SubscriberId = SubscriberId(-1);
    /// System-Listener des UDP-Relays
    pub const RELAY: SubscriberId = SubscriberId(-2);
    /// Verdrahtung im Server-Binary
    pub const SERVER: SubscriberId = SubscriberId(-3);
}

impl From<SessionId> for SubscriberId {
    fn from(id: SessionId) -> Self {
        SubscriberId(id.0)
    }
}
