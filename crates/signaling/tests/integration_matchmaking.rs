//! Integration: Login und Matchmaking ueber echte TCP-Verbindungen

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use matchhall_core::{EventBus, IdGenerator};
use matchhall_matchmaking::{MatchmakingConfig, MatchmakingCoordinator, RelayEndpoint, StaticRelayPool};
use matchhall_protocol::messages::{
    Heartbeat, LoginRequest, LoginResponse, MatchRequest, MatchResponse, MatchState,
};
use matchhall_protocol::wire::{read_frame, write_frame};
use matchhall_protocol::{deserialize_body, Envelope, ErrorCode, MessageType};
use matchhall_session::SessionRegistry;
use matchhall_signaling::handlers::alle_registrieren;
use matchhall_signaling::{SignalingConfig, SignalingServer, SignalingState};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;

const MAX_FRAME: usize = 4096;

struct Umgebung {
    state: Arc<SignalingState>,
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

async fn starten() -> Umgebung {
    let bus = EventBus::neu();
    let ids = Arc::new(IdGenerator::neu());
    let registry = SessionRegistry::neu(Arc::clone(&ids), bus.clone());
    let pool = StaticRelayPool::einzeln(
        RelayEndpoint {
            adresse: "127.0.0.1".into(),
            port: 12900,
        },
        8,
    );
    let matchmaking =
        MatchmakingCoordinator::neu(MatchmakingConfig::default(), ids, Arc::new(pool), bus.clone())
            .unwrap();
    let config = SignalingConfig {
        max_frame_groesse: MAX_FRAME,
        ..SignalingConfig::default()
    };
    let state = SignalingState::neu(config, bus, registry, matchmaking);
    alle_registrieren(&state);

    let server = SignalingServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.lokale_adresse().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(server.starten(shutdown_rx));

    Umgebung {
        state,
        addr,
        shutdown_tx,
        handle,
    }
}

async fn senden(stream: &mut TcpStream, env: Envelope) {
    write_frame(stream, &env, MAX_FRAME).await.unwrap();
}

async fn empfangen(stream: &mut TcpStream) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), read_frame(stream, MAX_FRAME))
        .await
        .expect("Zeitlimit beim Empfang")
        .unwrap()
        .expect("Verbindung unerwartet geschlossen")
}

async fn einloggen(addr: SocketAddr, account: &str) -> (TcpStream, LoginResponse) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    senden(
        &mut stream,
        Envelope::aus_nachricht(
            MessageType::CsLoginReq,
            &LoginRequest {
                account: account.into(),
            },
        ),
    )
    .await;
    let antwort = empfangen(&mut stream).await;
    assert_eq!(antwort.message_type, MessageType::ScLoginRes);
    assert!(antwort.ist_ok());
    let res = deserialize_body(&antwort.body).unwrap();
    (stream, res)
}

async fn match_antwort(stream: &mut TcpStream) -> MatchResponse {
    let env = empfangen(stream).await;
    assert_eq!(env.message_type, MessageType::ScMatchRes);
    deserialize_body(&env.body).unwrap()
}

async fn warten_bis(mut bedingung: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if bedingung() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bedingung()
}

#[tokio::test]
async fn zwei_clients_werden_demselben_raum_zugewiesen() {
    let u = starten().await;

    let (mut alice, alice_login) = einloggen(u.addr, "alice").await;
    let (mut bob, bob_login) = einloggen(u.addr, "bob").await;
    assert_ne!(alice_login.session_id, bob_login.session_id);

    let anfrage = Envelope::aus_nachricht(MessageType::CsMatchReq, &MatchRequest {});
    senden(&mut alice, anfrage.clone()).await;
    assert_eq!(match_antwort(&mut alice).await.state, MatchState::Pending as i32);

    senden(&mut bob, anfrage).await;
    assert_eq!(match_antwort(&mut bob).await.state, MatchState::Pending as i32);

    let a = match_antwort(&mut alice).await;
    let b = match_antwort(&mut bob).await;
    assert_eq!(a.state, MatchState::Assigned as i32);
    assert_eq!(b.state, MatchState::Assigned as i32);
    assert_eq!(a.room_id, b.room_id);
    assert_eq!(a.relay_address, "127.0.0.1");
    assert_eq!(a.relay_port, 12900);
    assert_eq!((a.player_index, b.player_index), (1, 2));

    // Heartbeat laeuft auf derselben Verbindung weiter
    senden(
        &mut alice,
        Envelope::aus_nachricht(
            MessageType::CsHeartbeat,
            &Heartbeat {
                client_ts: 42,
                server_ts: 0,
            },
        ),
    )
    .await;
    let hb = empfangen(&mut alice).await;
    assert_eq!(hb.message_type, MessageType::ScHeartbeat);

    // Verbindungsende baut die Session ab
    drop(alice);
    let state = Arc::clone(&u.state);
    assert!(warten_bis(|| state.registry.get_by_account("alice").is_none()).await);
    assert!(state.registry.get_by_account("bob").is_some());

    u.shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), u.handle)
        .await
        .expect("Accept-Loop muss nach Shutdown enden")
        .unwrap();
}

#[tokio::test]
async fn zu_grosser_frame_schliesst_verbindung() {
    let u = starten().await;
    let (mut stream, login) = einloggen(u.addr, "mallory").await;
    assert_eq!(u.state.registry.anzahl(), 1);

    // Laengen-Feld ueber dem Maximum
    let laenge = (MAX_FRAME as u32 + 1).to_be_bytes();
    stream.write_all(&laenge).await.unwrap();
    stream.write_all(&[0u8; 16]).await.unwrap();

    let ende = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut stream, MAX_FRAME))
        .await
        .expect("Server muss die Verbindung schliessen");
    assert!(matches!(ende, Ok(None) | Err(_)));

    let state = Arc::clone(&u.state);
    assert!(warten_bis(|| state.registry.anzahl() == 0).await);
    assert!(state
        .registry
        .get(matchhall_core::SessionId(login.session_id))
        .is_none());
    assert_eq!(
        state
            .statistik
            .fehlerhafte_frames
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    u.shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn unbekannter_typ_und_fehlender_login() {
    let u = starten().await;
    let mut stream = TcpStream::connect(u.addr).await.unwrap();

    senden(&mut stream, Envelope::neu(MessageType::Unbekannt(3000), Vec::new())).await;
    let antwort = empfangen(&mut stream).await;
    assert_eq!(antwort.message_type, MessageType::ScError);
    assert_eq!(antwort.error_code, ErrorCode::UNKNOWN_MESSAGE);

    senden(
        &mut stream,
        Envelope::aus_nachricht(MessageType::CsMatchReq, &MatchRequest {}),
    )
    .await;
    let antwort = empfangen(&mut stream).await;
    assert_eq!(antwort.message_type, MessageType::ScMatchRes);
    assert_eq!(antwort.error_code, ErrorCode::NOT_LOGGED_IN);

    u.shutdown_tx.send(true).unwrap();
}
