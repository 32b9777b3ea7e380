//! Match-Handler – Matchmaking-Anfragen und Abbruch

use std::sync::Arc;

use matchhall_matchmaking::AssignmentState;
use matchhall_protocol::messages::{
    CancelMatchRequest, CancelMatchResponse, MatchRequest, MatchResponse, MatchState,
};
use matchhall_protocol::{Envelope, ErrorCode, MessageType};

use crate::context::RequestContext;
use crate::server_state::SignalingState;

/// Grundgeruest einer `MatchResponse` fuer einen Zuweisungszustand
pub(crate) fn match_antwort(zustand: AssignmentState, tick: u64) -> MatchResponse {
    let state = match zustand {
        AssignmentState::Pending => MatchState::Pending,
        AssignmentState::Assigned => MatchState::Assigned,
        AssignmentState::Failed => MatchState::Failed,
    };
    MatchResponse {
        state: state as i32,
        tick,
        ..Default::default()
    }
}

/// Reiht die Session ein und bestaetigt mit `Pending`
///
/// Die Bestaetigung geht vor dem `join` in die Send-Queue: bildet der
/// Beitritt sofort eine Gruppe, folgt `Assigned` danach.
pub fn handle_match(
    state: &SignalingState,
    ctx: &RequestContext,
    env: &Envelope,
) -> anyhow::Result<()> {
    if env.body_lesen::<MatchRequest>().is_err() {
        ctx.fehler(MessageType::ScMatchRes, ErrorCode::SCHEMA_MISMATCH);
        return Ok(());
    }
    let Some(session) = ctx.session() else {
        ctx.fehler(MessageType::ScMatchRes, ErrorCode::NOT_LOGGED_IN);
        return Ok(());
    };

    session.raum_setzen(None);
    ctx.antworten(Envelope::aus_nachricht(
        MessageType::ScMatchRes,
        &match_antwort(AssignmentState::Pending, state.matchmaking.aktueller_tick()),
    ));

    let neu = state.matchmaking.join(Arc::clone(&session));
    tracing::debug!(
        account = session.account(),
        neu,
        wartend = state.matchmaking.queue_len(),
        "Matchmaking-Anfrage"
    );
    Ok(())
}

/// Zieht das Ticket der Session zurueck
pub fn handle_cancel(
    state: &SignalingState,
    ctx: &RequestContext,
    env: &Envelope,
) -> anyhow::Result<()> {
    if env.body_lesen::<CancelMatchRequest>().is_err() {
        ctx.fehler(MessageType::ScCancelMatchRes, ErrorCode::SCHEMA_MISMATCH);
        return Ok(());
    }
    let Some(session) = ctx.session() else {
        ctx.fehler(MessageType::ScCancelMatchRes, ErrorCode::NOT_LOGGED_IN);
        return Ok(());
    };

    let removed = state.matchmaking.leave(session.account());
    ctx.antworten(Envelope::aus_nachricht(
        MessageType::ScCancelMatchRes,
        &CancelMatchResponse { removed },
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::login_handler::handle_login;
    use crate::handlers::test_hilfe::{ctx_fuer, test_state};
    use matchhall_protocol::deserialize_body;
    use matchhall_protocol::messages::LoginRequest;

    fn einloggen(state: &SignalingState, ctx: &RequestContext, account: &str) {
        let env = Envelope::aus_nachricht(
            MessageType::CsLoginReq,
            &LoginRequest {
                account: account.into(),
            },
        );
        handle_login(state, ctx, &env).unwrap();
    }

    fn match_env() -> Envelope {
        Envelope::aus_nachricht(MessageType::CsMatchReq, &MatchRequest {})
    }

    fn antwort(rx: &mut tokio::sync::mpsc::Receiver<Envelope>) -> MatchResponse {
        let env = rx.try_recv().unwrap();
        assert_eq!(env.message_type, MessageType::ScMatchRes);
        deserialize_body(&env.body).unwrap()
    }

    #[test]
    fn match_ohne_login() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);
        handle_match(&state, &ctx, &match_env()).unwrap();
        assert_eq!(rx.try_recv().unwrap().error_code, ErrorCode::NOT_LOGGED_IN);
        assert_eq!(state.matchmaking.queue_len(), 0);
    }

    #[test]
    fn zwei_spieler_pending_dann_assigned() {
        let state = test_state();
        let (ctx_a, mut rx_a) = ctx_fuer(1);
        let (ctx_b, mut rx_b) = ctx_fuer(2);
        einloggen(&state, &ctx_a, "alice");
        einloggen(&state, &ctx_b, "bob");
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();

        handle_match(&state, &ctx_a, &match_env()).unwrap();
        assert_eq!(antwort(&mut rx_a).state, MatchState::Pending as i32);
        assert!(state.matchmaking.ist_in_warteschlange("alice"));

        handle_match(&state, &ctx_b, &match_env()).unwrap();
        assert_eq!(antwort(&mut rx_b).state, MatchState::Pending as i32);

        let a = antwort(&mut rx_a);
        let b = antwort(&mut rx_b);
        assert_eq!(a.state, MatchState::Assigned as i32);
        assert_eq!(b.state, MatchState::Assigned as i32);
        assert_eq!(a.room_id, b.room_id);
        assert_eq!((a.player_index, b.player_index), (1, 2));
        assert_eq!(state.matchmaking.queue_len(), 0);
    }

    #[test]
    fn antworten_tragen_den_tick_stand() {
        let state = test_state();
        let (ctx_a, mut rx_a) = ctx_fuer(1);
        let (ctx_b, mut rx_b) = ctx_fuer(2);
        einloggen(&state, &ctx_a, "alice");
        einloggen(&state, &ctx_b, "bob");
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();

        for _ in 0..3 {
            state.matchmaking.tick(std::time::Instant::now());
        }
        handle_match(&state, &ctx_a, &match_env()).unwrap();
        assert_eq!(antwort(&mut rx_a).tick, 3);

        state.matchmaking.tick(std::time::Instant::now());
        handle_match(&state, &ctx_b, &match_env()).unwrap();
        antwort(&mut rx_b);
        assert_eq!(antwort(&mut rx_a).tick, 4);
    }

    #[test]
    fn doppelte_anfrage_erzeugt_kein_zweites_ticket() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);
        einloggen(&state, &ctx, "alice");
        rx.try_recv().unwrap();

        handle_match(&state, &ctx, &match_env()).unwrap();
        handle_match(&state, &ctx, &match_env()).unwrap();
        assert_eq!(antwort(&mut rx).state, MatchState::Pending as i32);
        assert_eq!(antwort(&mut rx).state, MatchState::Pending as i32);
        assert_eq!(state.matchmaking.queue_len(), 1);
    }

    #[test]
    fn abbruch_meldet_ob_ticket_entfernt_wurde() {
        let state = test_state();
        let (ctx, mut rx) = ctx_fuer(1);
        einloggen(&state, &ctx, "alice");
        rx.try_recv().unwrap();

        let cancel = Envelope::aus_nachricht(MessageType::CsCancelMatchReq, &CancelMatchRequest {});
        handle_cancel(&state, &ctx, &cancel).unwrap();
        let res: CancelMatchResponse = deserialize_body(&rx.try_recv().unwrap().body).unwrap();
        assert!(!res.removed);

        handle_match(&state, &ctx, &match_env()).unwrap();
        rx.try_recv().unwrap();
        handle_cancel(&state, &ctx, &cancel).unwrap();
        let res: CancelMatchResponse = deserialize_body(&rx.try_recv().unwrap().body).unwrap();
        assert!(res.removed);
        assert_eq!(state.matchmaking.queue_len(), 0);
    }
}
