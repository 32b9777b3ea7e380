//! Bekannte Topic-Namen
//!
//! Module, die ueber den Event-Bus kommunizieren, einigen sich ueber diese
//! Namen auf eine gemeinsame Topic-ID.

/// `(RequestContext, Envelope)` – Login-Anfrage vom Client
pub const NET_LOGIN: &str = "net.login";
/// `(RequestContext, Envelope)` – Logout-Anfrage vom Client
pub const NET_LOGOUT: &str = "net.logout";
/// `(RequestContext, Envelope)` – Client moechte in die Warteschlange
pub const NET_MATCH: &str = "net.match";
/// `(RequestContext, Envelope)` – Client verlaesst die Warteschlange
pub const NET_MATCH_CANCEL: &str = "net.match_cancel";
/// `(RequestContext, Envelope)` – Heartbeat
pub const NET_HEARTBEAT: &str = "net.heartbeat";

/// `(MatchAssignment)` – eine Gruppe wurde gebildet
pub const MATCH_FOUND: &str = "match.found";
/// `(usize)` – Gruppe gebildet, aber kein Relay frei
pub const MATCH_NO_CAPACITY: &str = "match.no_capacity";
/// `(String)` – Ticket eines Accounts ist abgelaufen
pub const MATCH_EXPIRED: &str = "match.expired";

/// `(RoomId)` – Relay hat einen Raum geschlossen
pub const RELAY_ROOM_CLOSED: &str = "relay.room_closed";
