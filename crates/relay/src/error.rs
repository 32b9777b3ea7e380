//! Fehlertypen des UDP-Relays

use std::net::SocketAddr;

use matchhall_core::{RoomId, SessionId};
use matchhall_protocol::ProtocolError;
use thiserror::Error;

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Raum unbekannt: {0}")]
    RaumUnbekannt(RoomId),

    #[error("{session} ist kein Mitglied von {room}")]
    KeinMitglied { room: RoomId, session: SessionId },

    /// Absender hat nicht beigetreten oder sendet von einer anderen Adresse
    #[error("{session} ist in {room} nicht von dieser Adresse angemeldet")]
    NichtAngemeldet { room: RoomId, session: SessionId },

    /// Platz ist bereits von einer anderen Adresse belegt
    #[error("{session} ist in {room} bereits von {adresse} angemeldet")]
    AdresseBelegt {
        room: RoomId,
        session: SessionId,
        adresse: SocketAddr,
    },

    #[error(transparent)]
    Protokoll(#[from] ProtocolError),
}
