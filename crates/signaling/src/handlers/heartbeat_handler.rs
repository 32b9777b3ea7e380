//! Heartbeat – Echo mit Server-Zeitstempel, auch ohne Login erlaubt

use matchhall_protocol::messages::Heartbeat;
use matchhall_protocol::{Envelope, ErrorCode, MessageType};

use crate::context::RequestContext;
use crate::server_state::SignalingState;

pub fn handle_heartbeat(
    _state: &SignalingState,
    ctx: &RequestContext,
    env: &Envelope,
) -> anyhow::Result<()> {
    let ping: Heartbeat = match env.body_lesen() {
        Ok(h) => h,
        Err(_) => {
            ctx.fehler(MessageType::ScHeartbeat, ErrorCode::SCHEMA_MISMATCH);
            return Ok(());
        }
    };

    ctx.antworten(Envelope::aus_nachricht(
        MessageType::ScHeartbeat,
        &Heartbeat {
            client_ts: ping.client_ts,
            server_ts: chrono::Utc::now().timestamp_millis(),
        },
    ));
    Ok(())
}
