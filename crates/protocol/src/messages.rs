//! Protobuf-Nachrichten fuer Envelope-Bodies
//!
//! Die Schemas sind direkt per `prost`-derive deklariert. Tags sind Teil
//! des Vertrags mit dem Client und duerfen nicht umnummeriert werden.

// ---------------------------------------------------------------------------
// Login / Logout
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "1")]
    pub account: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginResponse {
    #[prost(int64, tag = "1")]
    pub session_id: i64,
    #[prost(string, tag = "2")]
    pub account: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogoutRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogoutResponse {}

// ---------------------------------------------------------------------------
// Matchmaking
// ---------------------------------------------------------------------------

/// Zustand einer Match-Zuweisung
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MatchState {
    Pending = 0,
    Assigned = 1,
    Failed = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchRequest {}

/// Antwort auf `CsMatchReq` (Pending) und spaetere Zuweisung (Assigned)
#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchResponse {
    #[prost(enumeration = "MatchState", tag = "1")]
    pub state: i32,
    #[prost(int32, tag = "2")]
    pub room_id: i32,
    #[prost(string, tag = "3")]
    pub relay_address: String,
    #[prost(uint32, tag = "4")]
    pub relay_port: u32,
    /// 1-basiert, Reihenfolge innerhalb der Gruppe
    #[prost(int32, tag = "5")]
    pub player_index: i32,
    /// Tick-Stand des Matchmakings beim Versand
    #[prost(uint64, tag = "6")]
    pub tick: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CancelMatchRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CancelMatchResponse {
    /// false wenn kein Ticket in der Warteschlange lag
    #[prost(bool, tag = "1")]
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct Heartbeat {
    /// Zeitstempel des Clients (ms), wird unveraendert zurueckgegeben
    #[prost(int64, tag = "1")]
    pub client_ts: i64,
    /// Serverzeit (ms seit Unix-Epoche), nur in der Antwort gesetzt
    #[prost(int64, tag = "2")]
    pub server_ts: i64,
}

// ---------------------------------------------------------------------------
// Relay (UDP)
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct JoinRoomRequest {
    #[prost(int32, tag = "1")]
    pub room_id: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum JoinResult {
    Failed = 0,
    Joined = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct JoinRoomResponse {
    #[prost(enumeration = "JoinResult", tag = "1")]
    pub result: i32,
    #[prost(int32, tag = "2")]
    pub player_index: i32,
    /// Gemeinsamer Seed aller Spieler eines Raums
    #[prost(int32, tag = "3")]
    pub random_seed: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LeaveRoomRequest {}
