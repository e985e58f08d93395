//! Disconnect reconciliation.
//!
//! A session can vanish at any moment with resources in any combination of
//! states, so cleanup never assumes a particular progression: every table is
//! swept for the session unconditionally, and each step is a no-op when
//! nothing matches. The sweep runs for both orderly closes and crashed
//! session actors.

use crate::egress::EgressManager;
use crate::events::{BroadcastEvent, EventSender};
use crate::registry::ResourceRegistry;
use tracing::{debug, info};

/// What a disconnect sweep removed, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectSummary {
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
    pub pipelines: usize,
}

/// Sweeps every resource owned by `session_id` and announces the
/// disconnect to remaining clients.
pub fn reconcile_disconnect(
    registry: &ResourceRegistry,
    egress: &EgressManager,
    events: &EventSender,
    session_id: &str,
) -> DisconnectSummary {
    // Egress first: cancel pipelines while their producers are still
    // registered, then close the producers themselves.
    let mut pipelines = 0;
    for producer_id in registry.session_producer_ids(session_id) {
        if egress.stop(&producer_id) {
            pipelines += 1;
            debug!(
                target: "broker.reconcile",
                session_id,
                producer_id = %producer_id,
                "stopped egress pipeline of disconnected session"
            );
        }
    }

    let producers = registry.remove_session_producers(session_id).len();
    let transports = registry.remove_session_transports(session_id).len();
    let consumers = registry.remove_session_consumers(session_id).len();

    events.broadcast(
        Some(session_id.to_string()),
        BroadcastEvent::ClientDisconnected {
            session_id: session_id.to_string(),
        },
    );

    let summary = DisconnectSummary {
        transports,
        producers,
        consumers,
        pipelines,
    };
    info!(
        target: "broker.reconcile",
        session_id,
        transports,
        producers,
        consumers,
        pipelines,
        clean = registry.session_is_clean(session_id),
        "session resources reconciled"
    );
    summary
}
