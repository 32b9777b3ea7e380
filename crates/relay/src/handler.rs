//! Raum-Handler
//!
//! Jeder Raum bekommt beim Anlegen einen eigenen Handler. Der Handler
//! entscheidet, welche Bytes an welche Adressen gehen; gesendet wird vom
//! Empfangs-Loop per `send_to`.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use matchhall_core::{RoomId, SessionId};
use matchhall_matchmaking::MatchAssignment;
use matchhall_protocol::Datagram;

/// Ein ausgehendes Datagramm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Weiterleitung {
    pub ziel: SocketAddr,
    pub daten: Bytes,
}

/// Was ein Handler ueber den Raum wissen darf
#[derive(Debug)]
pub struct RaumKontext<'a> {
    pub room_id: RoomId,
    pub absender: SessionId,
    /// Adressen aller anderen angemeldeten Spieler
    pub andere: &'a [SocketAddr],
}

/// Verarbeitet Spieldaten eines Raums
pub trait RoomHandler: Send + Sync {
    /// `roh` ist das vollstaendige Datagramm inklusive Header
    fn datagramm(&self, kontext: &RaumKontext<'_>, datagramm: &Datagram, roh: &Bytes)
        -> Vec<Weiterleitung>;
}

/// Erzeugt den Handler fuer einen neuen Raum
pub type HandlerFabrik = Arc<dyn Fn(&MatchAssignment) -> Arc<dyn RoomHandler> + Send + Sync>;

/// Standard-Handler: leitet jedes Datagramm unveraendert an alle anderen weiter
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingRoom;

impl ForwardingRoom {
    pub fn fabrik() -> HandlerFabrik {
        Arc::new(|_: &MatchAssignment| Arc::new(ForwardingRoom) as Arc<dyn RoomHandler>)
    }
}

impl RoomHandler for ForwardingRoom {
    fn datagramm(
        &self,
        kontext: &RaumKontext<'_>,
        _datagramm: &Datagram,
        roh: &Bytes,
    ) -> Vec<Weiterleitung> {
        kontext
            .andere
            .iter()
            .map(|ziel| Weiterleitung {
                ziel: *ziel,
                daten: roh.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchhall_protocol::{DatagramHeader, MessageType};

    #[test]
    fn weiterleitung_an_alle_anderen() {
        let andere: Vec<SocketAddr> = vec![
            "127.0.0.1:5001".parse().unwrap(),
            "127.0.0.1:5002".parse().unwrap(),
        ];
        let kontext = RaumKontext {
            room_id: RoomId(1),
            absender: SessionId(1),
            andere: &andere,
        };
        let dg = Datagram::new(
            DatagramHeader::new(RoomId(1), SessionId(1), MessageType::Relay),
            vec![1, 2, 3],
        );
        let roh = dg.encode();

        let raus = ForwardingRoom.datagramm(&kontext, &dg, &roh);
        assert_eq!(raus.len(), 2);
        assert_eq!(raus[0].ziel, andere[0]);
        assert_eq!(raus[1].daten, roh);
    }

    #[test]
    fn allein_im_raum_keine_weiterleitung() {
        let kontext = RaumKontext {
            room_id: RoomId(1),
            absender: SessionId(1),
            andere: &[],
        };
        let dg = Datagram::new(
            DatagramHeader::new(RoomId(1), SessionId(1), MessageType::Relay),
            Vec::new(),
        );
        assert!(ForwardingRoom
            .datagramm(&kontext, &dg, &dg.encode())
            .is_empty());
    }
}
