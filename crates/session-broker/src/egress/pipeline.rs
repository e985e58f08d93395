//! A single egress pipeline: one video producer feeding one transcoder.
//!
//! The pipeline task is the sole owner of its engine resources and child
//! process; every exit path funnels through one teardown. External parties
//! never release resources directly, they cancel the pipeline's stop token
//! (via [`EgressHandle::stop`]) and the task cleans up. Cancellation is
//! idempotent, so the two stop triggers (session disconnect, process exit)
//! can race freely.

use crate::config::EgressConfig;
use crate::engine::{Consumer, MediaEngine, PlainTransport, Producer};
use crate::events::{BroadcastEvent, EventSender};
use crate::observability::BrokerMetrics;
use crate::registry::ResourceRegistry;
use crate::errors::BrokerError;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ports, sdp, transcode};

/// Cloneable reference to a running pipeline.
///
/// Registered in the resource registry under the producer id. Holds only
/// metadata and the stop token; the pipeline task owns the real resources.
#[derive(Debug, Clone)]
pub struct EgressHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    producer_id: String,
    session_id: String,
    playlist_url: String,
    stop: CancellationToken,
    streaming: AtomicBool,
}

impl EgressHandle {
    pub(crate) fn new(producer_id: String, session_id: String, playlist_url: String) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                producer_id,
                session_id,
                playlist_url,
                stop: CancellationToken::new(),
                streaming: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn producer_id(&self) -> &str {
        &self.inner.producer_id
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    #[must_use]
    pub fn playlist_url(&self) -> &str {
        &self.inner.playlist_url
    }

    /// Requests teardown. Idempotent; actual release happens in the
    /// pipeline task.
    pub fn stop(&self) {
        self.inner.stop.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_cancelled()
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::SeqCst)
    }

    fn set_streaming(&self) {
        self.inner.streaming.store(true, Ordering::SeqCst);
    }

    fn stop_token(&self) -> CancellationToken {
        self.inner.stop.clone()
    }
}

/// The pipeline task state. Constructed by the manager, consumed by `run`.
pub(crate) struct PipelineRun {
    engine: Arc<dyn MediaEngine>,
    registry: Arc<ResourceRegistry>,
    events: EventSender,
    config: EgressConfig,
    metrics: Arc<BrokerMetrics>,
    handle: EgressHandle,
    producer: Arc<dyn Producer>,
    transport: Option<Arc<dyn PlainTransport>>,
    consumer: Option<Arc<dyn Consumer>>,
    child: Option<Child>,
}

impl PipelineRun {
    pub(crate) fn new(
        engine: Arc<dyn MediaEngine>,
        registry: Arc<ResourceRegistry>,
        events: EventSender,
        config: EgressConfig,
        metrics: Arc<BrokerMetrics>,
        handle: EgressHandle,
        producer: Arc<dyn Producer>,
    ) -> Self {
        Self {
            engine,
            registry,
            events,
            config,
            metrics,
            handle,
            producer,
            transport: None,
            consumer: None,
            child: None,
        }
    }

    pub(crate) async fn run(mut self) {
        self.metrics.pipeline_started();
        let producer_id = self.handle.producer_id().to_string();
        info!(target: "broker.egress", producer_id, "egress pipeline starting");

        if let Err(e) = self.drive().await {
            warn!(
                target: "broker.egress",
                producer_id,
                error = %e,
                "egress pipeline aborted"
            );
        }

        self.teardown().await;
        self.metrics.pipeline_stopped();
    }

    /// Walks the pipeline through its states. A cancelled stop token at any
    /// checkpoint short-circuits with `Ok`; teardown runs either way.
    async fn drive(&mut self) -> Result<(), BrokerError> {
        let producer_id = self.handle.producer_id().to_string();
        let stop = self.handle.stop_token();

        // -> TransportReady
        let transport = self.engine.create_plain_transport().await?;
        self.transport = Some(Arc::clone(&transport));
        if stop.is_cancelled() {
            return Ok(());
        }

        // -> ConsumerBound
        let capabilities = self.engine.rtp_capabilities()?;
        let consumer = transport.consume(&producer_id, &capabilities).await?;
        self.consumer = Some(Arc::clone(&consumer));

        let (rtp_port, rtcp_port) =
            ports::allocate_pair(self.config.rtp_port_min, self.config.rtp_port_max)?;
        transport
            .connect(Ipv4Addr::LOCALHOST.into(), rtp_port, rtcp_port)
            .await?;
        if stop.is_cancelled() {
            return Ok(());
        }

        // -> ProcessSpawned
        let out_dir = self.config.output_root.join(&producer_id);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| BrokerError::ExternalProcess(format!("create output dir: {e}")))?;

        let parameters = consumer.rtp_parameters();
        let codec = parameters
            .codecs
            .first()
            .ok_or_else(|| BrokerError::ExternalProcess("consumer has no negotiated codec".into()))?;
        let sdp_path = out_dir.join(transcode::SDP_FILE);
        let description = sdp::session_description(consumer.kind(), codec, rtp_port, rtcp_port);
        tokio::fs::write(&sdp_path, description)
            .await
            .map_err(|e| BrokerError::ExternalProcess(format!("write sdp: {e}")))?;

        let mut child = transcode::command(&self.config, consumer.kind(), &sdp_path, &out_dir)
            .spawn()
            .map_err(|e| {
                BrokerError::ExternalProcess(format!(
                    "spawn {}: {e}",
                    self.config.transcoder_bin.display()
                ))
            })?;
        debug!(
            target: "broker.egress",
            producer_id,
            pid = child.id(),
            rtp_port,
            "transcoder spawned"
        );

        // -> Streaming, after a bounded delay so the process has its UDP
        // sockets bound before media flows. Stop or early process exit
        // cancels the transition; a stopped pipeline must never resume its
        // consumer.
        tokio::select! {
            () = stop.cancelled() => {
                self.child = Some(child);
                return Ok(());
            }
            status = child.wait() => {
                return Err(BrokerError::ExternalProcess(match status {
                    Ok(s) => format!("transcoder exited before streaming: {s}"),
                    Err(e) => format!("transcoder wait failed: {e}"),
                }));
            }
            () = tokio::time::sleep(self.config.resume_delay) => {}
        }
        if stop.is_cancelled() {
            self.child = Some(child);
            return Ok(());
        }

        consumer.resume().await?;
        self.handle.set_streaming();
        self.events.broadcast(
            Some(self.handle.session_id().to_string()),
            BroadcastEvent::NewStreamer {
                id: self.handle.session_id().to_string(),
                url: self.handle.playlist_url().to_string(),
            },
        );
        info!(
            target: "broker.egress",
            producer_id,
            playlist = self.handle.playlist_url(),
            "egress streaming"
        );

        // -> Stopped, on whichever trigger fires first.
        tokio::select! {
            () = stop.cancelled() => {
                debug!(target: "broker.egress", producer_id, "egress stop requested");
            }
            status = child.wait() => {
                match status {
                    Ok(s) => info!(target: "broker.egress", producer_id, exit = %s, "transcoder exited"),
                    Err(e) => warn!(target: "broker.egress", producer_id, error = %e, "transcoder wait failed"),
                }
            }
        }
        self.child = Some(child);
        Ok(())
    }

    /// The single release path. Closes whatever was created, kills the
    /// process if still running, and removes the registry row.
    async fn teardown(&mut self) {
        let producer_id = self.handle.producer_id().to_string();
        self.handle.stop();

        if let Some(consumer) = self.consumer.take() {
            consumer.close();
        }
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    if let Err(e) = child.kill().await {
                        debug!(target: "broker.egress", producer_id, error = %e, "kill failed");
                    }
                }
            }
        }
        // A concurrent disconnect sweep may have removed the row already.
        self.registry.remove_pipeline(&producer_id);
        info!(
            target: "broker.egress",
            producer_id,
            producer_kind = %self.producer.kind(),
            "egress pipeline stopped"
        );
    }
}
