//! Egress pipeline manager.
//!
//! Spawns one pipeline task per live video producer and tracks them through
//! the resource registry's pipeline table. Start is fire-and-forget from the
//! caller's perspective; failures surface as pipeline logs, never as errors
//! on the producing client's request.

use crate::config::EgressConfig;
use crate::engine::{MediaEngine, Producer};
use crate::events::EventSender;
use crate::observability::BrokerMetrics;
use crate::registry::ResourceRegistry;
use std::sync::Arc;
use tracing::debug;

use super::pipeline::{EgressHandle, PipelineRun};

pub struct EgressManager {
    engine: Arc<dyn MediaEngine>,
    registry: Arc<ResourceRegistry>,
    events: EventSender,
    config: EgressConfig,
    metrics: Arc<BrokerMetrics>,
}

impl EgressManager {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        registry: Arc<ResourceRegistry>,
        events: EventSender,
        config: EgressConfig,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            engine,
            registry,
            events,
            config,
            metrics,
        }
    }

    /// Starts a pipeline for `producer`, owned by `session_id`.
    ///
    /// The handle is registered before any engine work so that disconnects
    /// and producer replacement can always reach the pipeline, even one
    /// still setting up. Registering under an occupied producer id cancels
    /// the previous pipeline.
    pub fn start(&self, session_id: &str, producer: Arc<dyn Producer>) {
        let producer_id = producer.id();
        let playlist_url = format!(
            "{}/{}/{}",
            self.config.playlist_url_base.trim_end_matches('/'),
            producer_id,
            super::transcode::PLAYLIST_FILE
        );
        let handle = EgressHandle::new(producer_id.clone(), session_id.to_string(), playlist_url);

        if self
            .registry
            .register_pipeline(&producer_id, handle.clone())
            .is_some()
        {
            debug!(
                target: "broker.egress",
                producer_id,
                "cancelled previous pipeline for producer id"
            );
        }

        let run = PipelineRun::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.registry),
            self.events.clone(),
            self.config.clone(),
            Arc::clone(&self.metrics),
            handle,
            producer,
        );
        tokio::spawn(run.run());
    }

    /// Cancels the pipeline for `producer_id`, if any. Returns whether a
    /// pipeline existed. The pipeline task releases its own resources.
    pub fn stop(&self, producer_id: &str) -> bool {
        self.registry.remove_pipeline(producer_id).is_some()
    }

    /// `(session_id, playlist_url)` for every pipeline currently streaming.
    #[must_use]
    pub fn streamers(&self) -> Vec<(String, String)> {
        self.registry
            .streaming_pipelines()
            .into_iter()
            .map(|h| (h.session_id().to_string(), h.playlist_url().to_string()))
            .collect()
    }
}
