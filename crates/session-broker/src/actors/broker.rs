//! Broker actor: supervises session actors and owns shared infrastructure.
//!
//! The broker actor is the entry point for the signaling frontend. It opens
//! and closes sessions, answers status queries and watches the media engine
//! worker; engine death is unrecoverable and cancels the whole actor tree.

use crate::config::Config;
use crate::egress::EgressManager;
use crate::engine::MediaEngine;
use crate::errors::BrokerError;
use crate::events::EventSender;
use crate::observability::{ActorType, BrokerMetrics};
use crate::reconcile::reconcile_disconnect;
use crate::registry::{RegistryCounts, ResourceRegistry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{BrokerMessage, StreamerInfo};
use super::session::{SessionActor, SessionActorHandle};

const SESSION_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time view of the broker, for status endpoints and tests.
#[derive(Debug, Clone)]
pub struct BrokerStatus {
    pub broker_id: String,
    pub session_count: usize,
    pub registry: RegistryCounts,
}

/// Cloneable handle to the broker actor.
#[derive(Clone)]
pub struct BrokerActorHandle {
    broker_id: String,
    sender: mpsc::Sender<BrokerMessage>,
    cancel_token: CancellationToken,
    events: EventSender,
}

impl BrokerActorHandle {
    /// Spawns the broker actor and its shared infrastructure.
    #[must_use]
    pub fn new(config: Config, engine: Arc<dyn MediaEngine>, metrics: Arc<BrokerMetrics>) -> Self {
        let cancel_token = CancellationToken::new();
        let registry = Arc::new(ResourceRegistry::new());
        let events = EventSender::new(config.event_channel_capacity);
        let egress = Arc::new(EgressManager::new(
            Arc::clone(&engine),
            Arc::clone(&registry),
            events.clone(),
            config.egress.clone(),
            Arc::clone(&metrics),
        ));

        let (sender, receiver) = mpsc::channel(config.broker_channel_buffer);
        let actor = BrokerActor {
            broker_id: config.broker_id.clone(),
            session_channel_buffer: config.session_channel_buffer,
            receiver,
            cancel_token: cancel_token.clone(),
            registry,
            engine,
            events: events.clone(),
            egress,
            metrics,
            sessions: HashMap::new(),
        };
        tokio::spawn(actor.run());

        Self {
            broker_id: config.broker_id,
            sender,
            cancel_token,
            events,
        }
    }

    #[must_use]
    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    /// The client event bus; the signaling frontend subscribes here.
    #[must_use]
    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Registers a new client session and returns its handle.
    pub async fn open_session(&self, session_id: String) -> Result<SessionActorHandle, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerMessage::OpenSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| BrokerError::Internal("broker actor unavailable".into()))?;
        rx.await
            .map_err(|_| BrokerError::Internal("broker actor dropped reply".into()))?
    }

    /// Closes a session and reconciles every resource it owned.
    pub async fn close_session(&self, session_id: String) -> Result<(), BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerMessage::CloseSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| BrokerError::Internal("broker actor unavailable".into()))?;
        rx.await
            .map_err(|_| BrokerError::Internal("broker actor dropped reply".into()))?
    }

    /// Sessions with an egress pipeline currently streaming.
    pub async fn streamers(&self) -> Result<Vec<StreamerInfo>, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerMessage::GetStreamers { respond_to: tx })
            .await
            .map_err(|_| BrokerError::Internal("broker actor unavailable".into()))?;
        rx.await
            .map_err(|_| BrokerError::Internal("broker actor dropped reply".into()))
    }

    pub async fn status(&self) -> Result<BrokerStatus, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BrokerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|_| BrokerError::Internal("broker actor unavailable".into()))?;
        rx.await
            .map_err(|_| BrokerError::Internal("broker actor dropped reply".into()))
    }

    /// Cancels the whole actor tree.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves when the broker has been cancelled (e.g. on engine death).
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await;
    }
}

struct ManagedSession {
    handle: SessionActorHandle,
    task: JoinHandle<()>,
    opened_at: DateTime<Utc>,
}

struct BrokerActor {
    broker_id: String,
    session_channel_buffer: usize,
    receiver: mpsc::Receiver<BrokerMessage>,
    cancel_token: CancellationToken,
    registry: Arc<ResourceRegistry>,
    engine: Arc<dyn MediaEngine>,
    events: EventSender,
    egress: Arc<EgressManager>,
    metrics: Arc<BrokerMetrics>,
    sessions: HashMap<String, ManagedSession>,
}

impl BrokerActor {
    async fn run(mut self) {
        info!(target: "broker.actor.broker", broker_id = %self.broker_id, "broker actor started");
        let mut died = self.engine.died();
        let mut watching_engine = true;

        loop {
            self.reap_finished_sessions().await;
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "broker.actor.broker", "broker actor cancelled");
                    break;
                }
                changed = died.changed(), if watching_engine => {
                    match changed {
                        Ok(()) => {
                            if *died.borrow() {
                                error!(
                                    target: "broker.actor.broker",
                                    "media engine worker died; broker is shutting down"
                                );
                                self.cancel_token.cancel();
                            }
                        }
                        Err(_) => watching_engine = false,
                    }
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.metrics.record_message_processed(ActorType::Broker);
                        }
                        None => {
                            debug!(target: "broker.actor.broker", "broker mailbox closed");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown_sessions();
        info!(target: "broker.actor.broker", broker_id = %self.broker_id, "broker actor stopped");
    }

    async fn handle_message(&mut self, message: BrokerMessage) {
        match message {
            BrokerMessage::OpenSession {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.open_session(session_id));
            }
            BrokerMessage::CloseSession {
                session_id,
                respond_to,
            } => {
                self.close_session(&session_id, respond_to);
            }
            BrokerMessage::GetStreamers { respond_to } => {
                let streamers = self
                    .egress
                    .streamers()
                    .into_iter()
                    .map(|(id, url)| StreamerInfo { id, url })
                    .collect();
                let _ = respond_to.send(streamers);
            }
            BrokerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(BrokerStatus {
                    broker_id: self.broker_id.clone(),
                    session_count: self.sessions.len(),
                    registry: self.registry.counts(),
                });
            }
        }
    }

    fn open_session(&mut self, session_id: String) -> Result<SessionActorHandle, BrokerError> {
        if self.sessions.contains_key(&session_id) {
            return Err(BrokerError::Internal(format!(
                "session already open: {session_id}"
            )));
        }

        let (handle, task) = SessionActor::spawn(
            session_id.clone(),
            self.session_channel_buffer,
            self.cancel_token.child_token(),
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
            self.events.clone(),
            Arc::clone(&self.egress),
            Arc::clone(&self.metrics),
        );
        self.sessions.insert(
            session_id.clone(),
            ManagedSession {
                handle: handle.clone(),
                task,
                opened_at: Utc::now(),
            },
        );
        self.metrics.session_opened();
        info!(
            target: "broker.actor.broker",
            session_id = %session_id,
            session_count = self.sessions.len(),
            "session opened"
        );
        Ok(handle)
    }

    fn close_session(
        &mut self,
        session_id: &str,
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    ) {
        let Some(managed) = self.sessions.remove(session_id) else {
            let _ = respond_to.send(Err(BrokerError::SessionNotFound(session_id.to_string())));
            return;
        };

        managed.handle.cancel();

        // Cancellation only takes effect between mailbox messages, so an
        // operation already in flight can still register resources. The
        // sweep must wait for the actor task to exit or those registrations
        // land after it and leak. Done off the broker loop, with a bounded
        // grace period; the reply resolves once the sweep is complete.
        let registry = Arc::clone(&self.registry);
        let egress = Arc::clone(&self.egress);
        let events = self.events.clone();
        let metrics = Arc::clone(&self.metrics);
        let owner = session_id.to_string();
        let opened_at = managed.opened_at;
        let task = managed.task;
        tokio::spawn(async move {
            match tokio::time::timeout(SESSION_EXIT_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    warn!(target: "broker.actor.broker", session_id = %owner, "session actor panicked");
                    metrics.record_panic(ActorType::Session);
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(
                        target: "broker.actor.broker",
                        session_id = %owner,
                        "session actor did not exit within grace period, sweeping anyway"
                    );
                }
            }

            let summary = reconcile_disconnect(&registry, &egress, &events, &owner);
            metrics.session_closed();

            let uptime = Utc::now() - opened_at;
            info!(
                target: "broker.actor.broker",
                session_id = %owner,
                uptime_secs = uptime.num_seconds(),
                transports = summary.transports,
                producers = summary.producers,
                consumers = summary.consumers,
                pipelines = summary.pipelines,
                "session closed"
            );
            let _ = respond_to.send(Ok(()));
        });
    }

    /// Detects session actors that exited without a close (bug or panic) and
    /// reconciles their resources so nothing leaks.
    async fn reap_finished_sessions(&mut self) {
        let finished: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, managed)| managed.task.is_finished())
            .map(|(session_id, _)| session_id.clone())
            .collect();

        for session_id in finished {
            if let Some(managed) = self.sessions.remove(&session_id) {
                warn!(
                    target: "broker.actor.broker",
                    session_id = %session_id,
                    "session actor exited unexpectedly, reconciling"
                );
                if let Err(e) = managed.task.await {
                    if e.is_panic() {
                        self.metrics.record_panic(ActorType::Session);
                    }
                }
                reconcile_disconnect(&self.registry, &self.egress, &self.events, &session_id);
                self.metrics.session_closed();
            }
        }
    }

    fn shutdown_sessions(&mut self) {
        let session_ids: Vec<String> = self.sessions.keys().cloned().collect();
        for session_id in session_ids {
            if let Some(managed) = self.sessions.remove(&session_id) {
                managed.handle.cancel();
                reconcile_disconnect(&self.registry, &self.egress, &self.events, &session_id);
                self.metrics.session_closed();
            }
        }
    }
}
