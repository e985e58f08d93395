//! Broker metrics.
//!
//! Counters and gauges are kept twice: as atomics for cheap in-process reads
//! (status queries, tests) and mirrored to the `metrics` facade for whatever
//! exporter the host process installs.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Actor identity for panic/restart metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Broker,
    Session,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Session => "session",
        }
    }
}

/// Shared metric counters for the broker and its session actors.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    active_sessions: AtomicUsize,
    active_pipelines: AtomicUsize,
    actor_panics: AtomicU64,
    messages_processed: AtomicU64,
}

impl BrokerMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        gauge!("broker_active_sessions").increment(1.0);
        counter!("broker_sessions_opened_total").increment(1);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        gauge!("broker_active_sessions").decrement(1.0);
        counter!("broker_sessions_closed_total").increment(1);
    }

    pub fn pipeline_started(&self) {
        self.active_pipelines.fetch_add(1, Ordering::Relaxed);
        gauge!("broker_active_pipelines").increment(1.0);
        counter!("broker_pipelines_started_total").increment(1);
    }

    pub fn pipeline_stopped(&self) {
        self.active_pipelines.fetch_sub(1, Ordering::Relaxed);
        gauge!("broker_active_pipelines").decrement(1.0);
        counter!("broker_pipelines_stopped_total").increment(1);
    }

    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        counter!("broker_actor_panics_total", "actor" => actor_type.as_str()).increment(1);
    }

    pub fn record_message_processed(&self, actor_type: ActorType) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        counter!("broker_messages_processed_total", "actor" => actor_type.as_str()).increment(1);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.active_pipelines.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn session_gauge_tracks_open_close() {
        let metrics = BrokerMetrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        assert_eq!(metrics.session_count(), 1);
    }

    #[test]
    fn pipeline_gauge_tracks_start_stop() {
        let metrics = BrokerMetrics::new();
        metrics.pipeline_started();
        metrics.pipeline_stopped();
        assert_eq!(metrics.pipeline_count(), 0);
    }

    #[test]
    fn panics_and_messages_accumulate() {
        let metrics = BrokerMetrics::new();
        metrics.record_panic(ActorType::Session);
        metrics.record_message_processed(ActorType::Broker);
        metrics.record_message_processed(ActorType::Session);
        assert_eq!(metrics.panic_count(), 1);
        assert_eq!(metrics.message_count(), 2);
    }
}
