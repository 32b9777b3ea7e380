//! Message-Dispatcher – Routet Envelopes ueber den Event-Bus
//!
//! Der Dispatcher kennt keine Handler. Er bestimmt pro Nachrichtentyp das
//! Topic und legt `(RequestContext, Envelope)` auf den Bus. Ob jemand
//! zustaendig war, sieht er am `PushReport`.
//!
//! ```text
//! Envelope(CsLoginReq) -> topic "net.login" -> push2(ctx, env)
//!                                                |
//!                        kein Empfaenger  <------+------> Listener-Fehler
//!                        UNKNOWN_MESSAGE                  INTERNAL
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use matchhall_core::PushReport;
use matchhall_protocol::{Envelope, ErrorCode, MessageType};

use crate::context::RequestContext;
use crate::server_state::SignalingState;

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Veroeffentlicht ein eingegangenes Envelope auf dem Bus
    ///
    /// Antworten schreiben die Handler selbst in die Send-Queue. Hier wird
    /// nur geantwortet, wenn kein Handler zustaendig war oder alle
    /// zustaendigen Handler fehlgeschlagen sind.
    pub fn dispatch(&self, ctx: &RequestContext, envelope: Envelope) -> PushReport {
        let typ = envelope.message_type;

        let report = match self.state.topics.fuer(typ) {
            Some(topic) => self.state.bus.push2(topic, ctx, &envelope),
            None => PushReport::default(),
        };

        if !report.hat_empfaenger() {
            self.state
                .statistik
                .unbekannte_nachrichten
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                verbindung = %ctx.verbindung,
                peer = %ctx.peer_addr,
                typ = %typ,
                "Kein Handler fuer Nachrichtentyp"
            );
            ctx.fehler(antwort_typ(typ), ErrorCode::UNKNOWN_MESSAGE);
        } else if report.aufgerufen == 0 {
            tracing::warn!(
                verbindung = %ctx.verbindung,
                typ = %typ,
                fehlgeschlagen = report.fehlgeschlagen,
                "Alle Handler fehlgeschlagen"
            );
            ctx.fehler(antwort_typ(typ), ErrorCode::INTERNAL);
        }

        report
    }
}

/// Antworttyp fuer Fehlerantworten; ohne bekanntes Paar `ScError`
fn antwort_typ(typ: MessageType) -> MessageType {
    typ.antwort().unwrap_or(MessageType::ScError)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_hilfe::{ctx_fuer, test_state};
    use matchhall_core::SubscriberId;

    fn test_ctx() -> (RequestContext, tokio::sync::mpsc::Receiver<Envelope>) {
        ctx_fuer(1)
    }

    #[test]
    fn ohne_handler_kommt_unknown_message() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (ctx, mut rx) = test_ctx();

        let report = dispatcher.dispatch(&ctx, Envelope::neu(MessageType::CsLoginReq, Vec::new()));
        assert!(!report.hat_empfaenger());

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.message_type, MessageType::ScLoginRes);
        assert_eq!(antwort.error_code, ErrorCode::UNKNOWN_MESSAGE);
        assert_eq!(state.statistik.unbekannte_nachrichten.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unbekannter_typ_antwortet_mit_sc_error() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(state);
        let (ctx, mut rx) = test_ctx();

        dispatcher.dispatch(&ctx, Envelope::neu(MessageType::Unbekannt(4242), Vec::new()));

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.message_type, MessageType::ScError);
        assert_eq!(antwort.error_code, ErrorCode::UNKNOWN_MESSAGE);
    }

    #[test]
    fn fehlgeschlagener_handler_ergibt_internal() {
        let state = test_state();
        state.bus.add_listener2(
            SubscriberId::SIGNALING,
            state.topics.heartbeat,
            |_: &RequestContext, _: &Envelope| anyhow::bail!("kaputt"),
        );
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (ctx, mut rx) = test_ctx();

        let report = dispatcher.dispatch(&ctx, Envelope::neu(MessageType::CsHeartbeat, Vec::new()));
        assert_eq!(report.fehlgeschlagen, 1);

        let antwort = rx.try_recv().unwrap();
        assert_eq!(antwort.message_type, MessageType::ScHeartbeat);
        assert_eq!(antwort.error_code, ErrorCode::INTERNAL);
    }

    #[test]
    fn erfolgreicher_handler_ohne_dispatcher_antwort() {
        let state = test_state();
        state.bus.add_listener2(
            SubscriberId::SIGNALING,
            state.topics.heartbeat,
            |_: &RequestContext, _: &Envelope| Ok(()),
        );
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (ctx, mut rx) = test_ctx();

        let report = dispatcher.dispatch(&ctx, Envelope::neu(MessageType::CsHeartbeat, Vec::new()));
        assert_eq!(report.aufgerufen, 1);
        assert!(rx.try_recv().is_err());
    }
}
