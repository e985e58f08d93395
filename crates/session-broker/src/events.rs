//! Broadcast events pushed to connected clients.
//!
//! The broker does not own client connections; the signaling frontend
//! subscribes via [`EventSender::subscribe`] and fans each event out to its
//! sockets, skipping the origin session where one is set.

use crate::engine::MediaKind;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Events announced to all clients except the origin session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// A new producer is available for consumption.
    #[serde(rename_all = "camelCase")]
    NewProducer {
        producer_id: String,
        #[serde(rename = "socketId")]
        session_id: String,
        kind: MediaKind,
    },
    /// An egress pipeline started streaming and its playlist is ready.
    NewStreamer { id: String, url: String },
    /// A session disconnected; its media is gone.
    #[serde(rename_all = "camelCase")]
    ClientDisconnected {
        #[serde(rename = "socketId")]
        session_id: String,
    },
}

/// A [`BroadcastEvent`] plus the session that caused it, so the frontend can
/// exclude the origin from delivery.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub origin: Option<String>,
    pub event: BroadcastEvent,
}

/// Cloneable sender half of the event bus.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<OutboundEvent>,
}

impl EventSender {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    /// Best-effort broadcast; having no subscribers is not an error.
    pub fn broadcast(&self, origin: Option<String>, event: BroadcastEvent) {
        trace!(target: "broker.events", ?event, ?origin, "broadcasting");
        let _ = self.tx.send(OutboundEvent { origin, event });
    }
}
