//! Login-Handler – Login, Logout und Session-Listener
//!
//! Beim Login wird die Session an das Transport-Handle der Verbindung
//! gebunden und fuer `match.found` / `match.expired` angemeldet. Die
//! Session-Listener laufen unter der Session-Id als Subscriber und werden
//! von `SessionRegistry::remove` mit `clear_all_event_register` entfernt.

use std::sync::{Arc, Weak};

use matchhall_core::SubscriberId;
use matchhall_matchmaking::{AssignmentState, MatchAssignment};
use matchhall_protocol::messages::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, MatchResponse,
};
use matchhall_protocol::{Envelope, ErrorCode, MessageType};
use matchhall_session::Session;

use crate::context::RequestContext;
use crate::error::SignalingError;
use crate::handlers::match_handler::match_antwort;
use crate::server_state::SignalingState;

/// Verarbeitet eine Login-Anfrage
pub fn handle_login(
    state: &SignalingState,
    ctx: &RequestContext,
    env: &Envelope,
) -> anyhow::Result<()> {
    let request: LoginRequest = match env.body_lesen() {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(verbindung = %ctx.verbindung, fehler = %e, "Login-Body ungueltig");
            ctx.fehler(MessageType::ScLoginRes, ErrorCode::SCHEMA_MISMATCH);
            return Ok(());
        }
    };

    if ctx.session().is_some() {
        ctx.fehler(MessageType::ScLoginRes, ErrorCode::ALREADY_LOGGED_IN);
        return Ok(());
    }

    let account = request.account.trim();
    if account.is_empty() {
        ctx.fehler(MessageType::ScLoginRes, ErrorCode::SCHEMA_MISMATCH);
        return Ok(());
    }

    let session = state
        .registry
        .get_or_create(account)
        .map_err(SignalingError::from)?;

    // Account ist ueber eine andere, noch lebende Verbindung aktiv
    if let Err(aktiv) = session.transport_binden_wenn_frei(ctx.transport.clone()) {
        tracing::info!(
            account,
            verbindung = %ctx.verbindung,
            aktiv = %aktiv.verbindung,
            "Login abgelehnt: Account in Benutzung"
        );
        ctx.fehler(MessageType::ScLoginRes, ErrorCode::ACCOUNT_IN_USE);
        return Ok(());
    }

    ctx.session_setzen(Some(Arc::clone(&session)));
    session_listener_anmelden(state, &session);

    tracing::info!(
        account,
        session = %session.id(),
        verbindung = %ctx.verbindung,
        peer = %ctx.peer_addr,
        "Login erfolgreich"
    );

    ctx.antworten(Envelope::aus_nachricht(
        MessageType::ScLoginRes,
        &LoginResponse {
            session_id: session.id().inner(),
            account: session.account().to_string(),
        },
    ));
    Ok(())
}

/// Verarbeitet eine Logout-Anfrage
///
/// Zieht ein wartendes Ticket zurueck und entfernt die Session. Die
/// Verbindung bleibt offen und kann sich erneut einloggen.
pub fn handle_logout(
    state: &SignalingState,
    ctx: &RequestContext,
    env: &Envelope,
) -> anyhow::Result<()> {
    if env.body_lesen::<LogoutRequest>().is_err() {
        ctx.fehler(MessageType::ScLogoutRes, ErrorCode::SCHEMA_MISMATCH);
        return Ok(());
    }

    let Some(session) = ctx.session_nehmen() else {
        ctx.fehler(MessageType::ScLogoutRes, ErrorCode::NOT_LOGGED_IN);
        return Ok(());
    };

    session_beenden(state, &session, ctx);
    tracing::info!(account = session.account(), session = %session.id(), "Logout");

    ctx.antworten(Envelope::aus_nachricht(
        MessageType::ScLogoutRes,
        &LogoutResponse {},
    ));
    Ok(())
}

/// Gemeinsamer Abbau fuer Logout und Verbindungsende
///
/// Nur die Verbindung, an der die Session gerade haengt, zieht das Ticket
/// zurueck und entfernt die Session. Gibt `true` zurueck wenn abgebaut wurde.
pub(crate) fn session_beenden(state: &SignalingState, session: &Session, ctx: &RequestContext) -> bool {
    if !session.transport_loesen(ctx.verbindung) {
        tracing::debug!(
            session = %session.id(),
            verbindung = %ctx.verbindung,
            "Session gehoert einer anderen Verbindung"
        );
        return false;
    }
    state.matchmaking.leave(session.account());
    state.registry.remove(session.id());
    true
}

/// Meldet die Session fuer Match-Ergebnisse an
fn session_listener_anmelden(state: &SignalingState, session: &Arc<Session>) {
    let subscriber = SubscriberId::from(session.id());
    // Erneuter Login derselben Session darf nicht doppelt zustellen
    state.bus.clear_all_event_register(subscriber);

    let schwach: Weak<Session> = Arc::downgrade(session);
    state.bus.add_listener1(
        subscriber,
        state.topics.match_found,
        move |zuweisung: &MatchAssignment| {
            if let Some(session) = schwach.upgrade() {
                zuweisung_zustellen(&session, zuweisung);
            }
            Ok(())
        },
    );

    let schwach: Weak<Session> = Arc::downgrade(session);
    let tick_quelle = state.matchmaking.clone();
    state.bus.add_listener1(
        subscriber,
        state.topics.match_expired,
        move |account: &String| {
            let Some(session) = schwach.upgrade() else {
                return Ok(());
            };
            if session.account() == account {
                tracing::debug!(account = %account, "Ticket abgelaufen");
                session.senden_oder_trennen(Envelope::aus_nachricht(
                    MessageType::ScMatchRes,
                    &match_antwort(AssignmentState::Failed, tick_quelle.aktueller_tick()),
                ));
            }
            Ok(())
        },
    );
}

fn zuweisung_zustellen(session: &Session, zuweisung: &MatchAssignment) {
    let Some(mitglied) = zuweisung.mitglied(session.id()) else {
        return;
    };
    session.raum_setzen(Some(zuweisung.room_id));

    let antwort = MatchResponse {
        room_id: zuweisung.room_id.inner(),
        relay_address: zuweisung.relay.adresse.clone(),
        relay_port: u32::from(zuweisung.relay.port),
        player_index: mitglied.player_index,
        ..match_antwort(zuweisung.state, zuweisung.tick)
    };
    // Ohne Zuweisung wartet der Client ewig; lieber trennen
    if !session.senden_oder_trennen(Envelope::aus_nachricht(MessageType::ScMatchRes, &antwort)) {
        tracing::warn!(
            session = %session.id(),
            room = %zuweisung.room_id,
            "Zuweisung konnte nicht zugestellt werden"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_hilfe::{ctx_fuer, test_state};
    use matchhall_core::{ConnectionId, RoomId, SessionId};
    use matchhall_matchmaking::{MatchMember, RelayEndpoint};
    use matchhall_protocol::deserialize_body;
    use matchhall_protocol::messages::MatchState;

    fn login(account: &str) -> Envelope {
        Envelope::aus_nachricht(
            MessageType::CsLoginReq,
            &LoginRequest {
                account: account.into(),
            },
        )
    }

    #[test]
    fn login_legt_session_an_und_antwortet() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);

        handle_login(&state, &ctx, &login("alice")).unwrap();

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.message_type, MessageType::ScLoginRes);
        assert!(antwort.ist_ok());
        let res: LoginResponse = deserialize_body(&antwort.body).unwrap();
        assert_eq!(res.account, "alice");

        let session = state.registry.get_by_account("alice").unwrap();
        assert_eq!(session.id(), SessionId(res.session_id));
        assert!(session.ist_online());
        assert_eq!(ctx.session().unwrap().id(), session.id());
        // match.found + match.expired
        assert_eq!(state.bus.listener_von(SubscriberId::from(session.id())), 2);
    }

    #[test]
    fn zweiter_login_auf_derselben_verbindung() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);

        handle_login(&state, &ctx, &login("alice")).unwrap();
        rx.try_recv().unwrap();
        handle_login(&state, &ctx, &login("bob")).unwrap();

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.error_code, ErrorCode::ALREADY_LOGGED_IN);
        assert!(state.registry.get_by_account("bob").is_none());
    }

    #[test]
    fn account_auf_anderer_verbindung_in_benutzung() {
        let state = test_state();
        let (ctx1, _rx1) = ctx_fuer(1);
        let (ctx2, mut rx2) = ctx_fuer(2);

        handle_login(&state, &ctx1, &login("alice")).unwrap();
        handle_login(&state, &ctx2, &login("alice")).unwrap();

        let antwort = rx2.try_recv().unwrap();
        assert_eq!(antwort.error_code, ErrorCode::ACCOUNT_IN_USE);
        assert!(ctx2.session().is_none());
        assert_eq!(state.registry.anzahl(), 1);
    }

    #[test]
    fn kaputter_body_ergibt_schema_mismatch() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);

        let env = Envelope::neu(MessageType::CsLoginReq, vec![0xFF, 0xFF, 0xFF]);
        handle_login(&state, &ctx, &env).unwrap();

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.error_code, ErrorCode::SCHEMA_MISMATCH);
        assert_eq!(state.registry.anzahl(), 0);
    }

    #[test]
    fn leerer_account_wird_abgelehnt() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);

        handle_login(&state, &ctx, &login("   ")).unwrap();
        assert_eq!(rx.try_recv().unwrap().error_code, ErrorCode::SCHEMA_MISMATCH);
    }

    #[test]
    fn logout_ohne_login() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);

        let env = Envelope::aus_nachricht(MessageType::CsLogoutReq, &LogoutRequest {});
        handle_logout(&state, &ctx, &env).unwrap();
        assert_eq!(rx.try_recv().unwrap().error_code, ErrorCode::NOT_LOGGED_IN);
    }

    #[test]
    fn logout_entfernt_session_und_listener() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);

        handle_login(&state, &ctx, &login("alice")).unwrap();
        rx.try_recv().unwrap();
        let id = ctx.session().unwrap().id();

        let env = Envelope::aus_nachricht(MessageType::CsLogoutReq, &LogoutRequest {});
        handle_logout(&state, &ctx, &env).unwrap();

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.message_type, MessageType::ScLogoutRes);
        assert!(antwort.ist_ok());
        assert!(state.registry.get(id).is_none());
        assert!(ctx.session().is_none());
        assert_eq!(state.bus.listener_von(SubscriberId::from(id)), 0);
    }

    #[test]
    fn zuweisung_geht_nur_an_mitglieder() {
        let state = test_state();
        let (ctx_a, mut rx_a) = ctx_fuer(1);
        let (ctx_b, mut rx_b) = ctx_fuer(2);

        handle_login(&state, &ctx_a, &login("alice")).unwrap();
        handle_login(&state, &ctx_b, &login("bob")).unwrap();
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();

        let alice = ctx_a.session().unwrap();
        state.bus.push1(
            state.topics.match_found,
            &MatchAssignment {
                room_id: RoomId(77),
                relay: RelayEndpoint {
                    adresse: "10.0.0.1".into(),
                    port: 12900,
                },
                state: AssignmentState::Assigned,
                tick: 0,
                members: vec![MatchMember {
                    session_id: alice.id(),
                    account: "alice".into(),
                    player_index: 1,
                }],
            },
        );

        let antwort = rx_a.try_recv().unwrap();
        let res: MatchResponse = deserialize_body(&antwort.body).unwrap();
        assert_eq!(res.state, MatchState::Assigned as i32);
        assert_eq!(res.room_id, 77);
        assert_eq!(res.relay_address, "10.0.0.1");
        assert_eq!(res.relay_port, 12900);
        assert_eq!(res.player_index, 1);
        assert_eq!(alice.room_id(), Some(RoomId(77)));

        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn abgelaufenes_ticket_meldet_failed() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(3);

        handle_login(&state, &ctx, &login("carol")).unwrap();
        rx.try_recv().unwrap();

        state
            .bus
            .push1(state.topics.match_expired, &"dave".to_string());
        assert!(rx.try_recv().is_err());

        state
            .bus
            .push1(state.topics.match_expired, &"carol".to_string());
        let res: MatchResponse = deserialize_body(&rx.try_recv().unwrap().body).unwrap();
        assert_eq!(res.state, MatchState::Failed as i32);
    }

    #[test]
    fn session_beenden_ignoriert_fremde_verbindung() {
        let state = test_state();
        let (ctx, _rx) = ctx_fuer(1);
        handle_login(&state, &ctx, &login("alice")).unwrap();
        let session = ctx.session().unwrap();
        state.matchmaking.join(Arc::clone(&session));

        let (fremd, _rx2) = ctx_fuer(9);
        assert!(!session_beenden(&state, &session, &fremd));
        assert!(state.registry.get(session.id()).is_some());
        assert!(state.matchmaking.ist_in_warteschlange("alice"));
        assert_eq!(
            session.transport().map(|t| t.verbindung),
            Some(ConnectionId(1))
        );
    }

    #[test]
    fn gleichzeitiger_login_hat_genau_einen_gewinner() {
        for runde in 0..50 {
            let state = test_state();
            let account = format!("spieler{runde}");
            let (ctx1, mut rx1) = ctx_fuer(1);
            let (ctx2, mut rx2) = ctx_fuer(2);
            let barriere = std::sync::Barrier::new(2);

            std::thread::scope(|s| {
                for ctx in [&ctx1, &ctx2] {
                    let (state, barriere, env) = (&state, &barriere, login(&account));
                    s.spawn(move || {
                        barriere.wait();
                        handle_login(state, ctx, &env).unwrap();
                    });
                }
            });

            let codes = [
                rx1.try_recv().unwrap().error_code,
                rx2.try_recv().unwrap().error_code,
            ];
            assert_eq!(codes.iter().filter(|c| **c == ErrorCode::OK).count(), 1);
            assert!(codes.contains(&ErrorCode::ACCOUNT_IN_USE));
            assert!(ctx1.session().is_some() ^ ctx2.session().is_some());

            // Der Verlierer darf beim Abbau das Ticket des Gewinners nicht anfassen
            let (gewinner, verlierer) = if ctx1.session().is_some() {
                (&ctx1, &ctx2)
            } else {
                (&ctx2, &ctx1)
            };
            let session = gewinner.session().unwrap();
            state.matchmaking.join(Arc::clone(&session));
            assert!(!session_beenden(&state, &session, verlierer));
            assert!(state.matchmaking.ist_in_warteschlange(&account));
            assert_eq!(
                session.transport().map(|t| t.verbindung),
                Some(gewinner.verbindung)
            );
        }
    }

    #[test]
    fn volle_queue_trennt_bei_zuweisung() {
        let state = test_state();
        let (ctx, _rx) = ctx_fuer(1);
        handle_login(&state, &ctx, &login("alice")).unwrap();
        let alice = ctx.session().unwrap();
        let signal = ctx.transport.trenn_signal();

        // Queue bis zum Rand fuellen (Login-Antwort liegt schon drin)
        while ctx.transport.senden(Envelope::neu(MessageType::ScHeartbeat, Vec::new())) {}
        assert!(!*signal.borrow());

        state.bus.push1(
            state.topics.match_found,
            &MatchAssignment {
                room_id: RoomId(5),
                relay: RelayEndpoint {
                    adresse: "127.0.0.1".into(),
                    port: 12900,
                },
                state: AssignmentState::Assigned,
                tick: 0,
                members: vec![MatchMember {
                    session_id: alice.id(),
                    account: "alice".into(),
                    player_index: 1,
                }],
            },
        );
        assert!(*signal.borrow());
    }
}
