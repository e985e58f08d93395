//! Broadcast event collection for tests.

use session_broker::events::{BroadcastEvent, EventSender, OutboundEvent};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Subscribes to the broker event bus and awaits matching events.
pub struct EventCollector {
    rx: broadcast::Receiver<OutboundEvent>,
}

impl EventCollector {
    pub fn new(events: &EventSender) -> Self {
        Self {
            rx: events.subscribe(),
        }
    }

    /// Waits until an event matching `pred` arrives, or `timeout` elapses.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&BroadcastEvent) -> bool,
    ) -> Option<OutboundEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Ok(event)) if pred(&event.event) => return Some(event),
                Ok(Ok(_)) => {}
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    /// Drains everything currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
