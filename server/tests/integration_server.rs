//! Integration: Login, Matchmaking und Relay-Uebergabe gegen den ganzen Server

use std::net::SocketAddr;
use std::time::Duration;

use matchhall_core::{RoomId, SessionId};
use matchhall_protocol::messages::{
    JoinResult, JoinRoomRequest, JoinRoomResponse, LeaveRoomRequest, LoginRequest, LoginResponse,
    MatchRequest, MatchResponse, MatchState,
};
use matchhall_protocol::wire::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
use matchhall_protocol::{deserialize_body, Datagram, DatagramHeader, Envelope, MessageType};
use matchhall_server::config::ServerConfig;
use matchhall_server::Server;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.tcp_port = 0;
    config.netzwerk.udp_port = 0;
    config.observability.aktiviert = false;
    config.matchmaking.tick_ms = 50;
    config
}

async fn anfrage<M: prost::Message + Default>(
    stream: &mut TcpStream,
    typ: MessageType,
    nachricht: &impl prost::Message,
) -> M {
    write_frame(stream, &Envelope::aus_nachricht(typ, nachricht), DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();
    antwort(stream).await
}

async fn antwort<M: prost::Message + Default>(stream: &mut TcpStream) -> M {
    let env = tokio::time::timeout(
        Duration::from_secs(2),
        read_frame(stream, DEFAULT_MAX_FRAME_SIZE),
    )
    .await
    .expect("Zeitlimit beim Empfang")
    .unwrap()
    .expect("Verbindung geschlossen");
    assert!(env.ist_ok(), "Fehlercode {}", env.error_code);
    deserialize_body(&env.body).unwrap()
}

async fn udp_austausch(socket: &UdpSocket, ziel: SocketAddr, dg: &Datagram) -> Datagram {
    socket.send_to(&dg.encode(), ziel).await.unwrap();
    let mut buf = [0u8; 1500];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("Zeitlimit beim UDP-Empfang")
        .unwrap();
    Datagram::decode(&buf[..len]).unwrap()
}

#[tokio::test]
async fn vom_login_bis_zum_relay_raum() {
    let server = Server::binden(test_config()).await.unwrap();
    let tcp = server.tcp_adresse().unwrap();
    let udp = server.udp_adresse().unwrap();
    let registry = server.registry().clone();
    let raeume = server.raeume().clone();
    let metriken = server.metriken().clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lauf = tokio::spawn(server.laufen(shutdown_rx));

    // Login
    let mut a = TcpStream::connect(tcp).await.unwrap();
    let mut b = TcpStream::connect(tcp).await.unwrap();
    let login_a: LoginResponse = anfrage(
        &mut a,
        MessageType::CsLoginReq,
        &LoginRequest {
            account: "alice".into(),
        },
    )
    .await;
    let login_b: LoginResponse = anfrage(
        &mut b,
        MessageType::CsLoginReq,
        &LoginRequest {
            account: "bob".into(),
        },
    )
    .await;
    assert_eq!(registry.anzahl(), 2);

    // Matchmaking
    let pending: MatchResponse = anfrage(&mut a, MessageType::CsMatchReq, &MatchRequest {}).await;
    assert_eq!(pending.state, MatchState::Pending as i32);
    let pending: MatchResponse = anfrage(&mut b, MessageType::CsMatchReq, &MatchRequest {}).await;
    assert_eq!(pending.state, MatchState::Pending as i32);

    let zuweisung_a: MatchResponse = antwort(&mut a).await;
    let zuweisung_b: MatchResponse = antwort(&mut b).await;
    assert_eq!(zuweisung_a.state, MatchState::Assigned as i32);
    assert_eq!(zuweisung_a.room_id, zuweisung_b.room_id);
    assert_eq!(zuweisung_a.relay_port, 12900);
    assert_eq!(metriken.matches_total.get(), 1);

    let raum = RoomId(zuweisung_a.room_id);
    assert!(raeume.existiert(raum));
    assert_eq!(registry.get(SessionId(login_a.session_id)).unwrap().room_id(), Some(raum));

    // Relay-Beitritt ueber UDP
    let udp_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let udp_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut seeds = Vec::new();
    for (socket, session) in [(&udp_a, login_a.session_id), (&udp_b, login_b.session_id)] {
        let join = Datagram::aus_nachricht(
            DatagramHeader::new(raum, SessionId(session), MessageType::CsJoinRoom),
            &JoinRoomRequest { room_id: raum.0 },
        );
        let res: JoinRoomResponse =
            deserialize_body(&udp_austausch(socket, udp, &join).await.nutzdaten).unwrap();
        assert_eq!(res.result, JoinResult::Joined as i32);
        seeds.push(res.random_seed);
    }
    assert_eq!(seeds[0], seeds[1]);

    // Beide verlassen den Raum -> geschlossen, Relay-Platz frei
    for (socket, session) in [(&udp_a, login_a.session_id), (&udp_b, login_b.session_id)] {
        let leave = Datagram::aus_nachricht(
            DatagramHeader::new(raum, SessionId(session), MessageType::CsLeaveRoom),
            &LeaveRoomRequest {},
        );
        socket.send_to(&leave.encode(), udp).await.unwrap();
    }
    for _ in 0..100 {
        if metriken.rooms_closed_total.get() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(metriken.rooms_closed_total.get(), 1);
    assert!(!raeume.existiert(raum));

    // Shutdown baut die Sessions ab
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), lauf)
        .await
        .expect("Server muss nach Shutdown enden")
        .unwrap()
        .unwrap();
    assert_eq!(registry.anzahl(), 0);
}
