//! Handler fuer alle Control-Nachrichten
//!
//! Jeder Handler haengt als Listener mit Arity 2 (`RequestContext`,
//! `Envelope`) an seinem Netz-Topic. Die Listener halten den
//! `SignalingState` nur schwach, damit Bus und State keinen Zyklus bilden.

use std::sync::{Arc, Weak};

use matchhall_core::{SubscriberId, TopicId};
use matchhall_protocol::Envelope;

use crate::context::RequestContext;
use crate::server_state::SignalingState;

pub mod heartbeat_handler;
pub mod login_handler;
pub mod match_handler;

/// Registriert alle Handler auf dem Bus des States
pub fn alle_registrieren(state: &Arc<SignalingState>) {
    let t = state.topics;
    anmelden(state, t.login, login_handler::handle_login);
    anmelden(state, t.logout, login_handler::handle_logout);
    anmelden(state, t.match_anfrage, match_handler::handle_match);
    anmelden(state, t.match_abbruch, match_handler::handle_cancel);
    anmelden(state, t.heartbeat, heartbeat_handler::handle_heartbeat);

    tracing::debug!(
        listener = state.bus.listener_von(SubscriberId::SIGNALING),
        "Signaling-Handler registriert"
    );
}

type Handler = fn(&SignalingState, &RequestContext, &Envelope) -> anyhow::Result<()>;

fn anmelden(state: &Arc<SignalingState>, topic: TopicId, handler: Handler) {
    let schwach: Weak<SignalingState> = Arc::downgrade(state);
    state.bus.add_listener2(
        SubscriberId::SIGNALING,
        topic,
        move |ctx: &RequestContext, env: &Envelope| match schwach.upgrade() {
            Some(state) => handler(&state, ctx, env),
            None => Ok(()),
        },
    );
}
