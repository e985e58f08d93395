//! Session actor: one per connected client.
//!
//! The actor owns the client's negotiated receive capabilities and performs
//! every client-initiated operation against the registry and the engine.
//! Because operations flow through one mailbox, a session's requests are
//! serialized in arrival order; concurrent requests from different sessions
//! interleave freely.

use crate::egress::EgressManager;
use crate::engine::{
    DtlsParameters, MediaEngine, MediaKind, RtpCapabilities, RtpParameters, TransportConnectInfo,
};
use crate::errors::BrokerError;
use crate::events::{BroadcastEvent, EventSender};
use crate::observability::{ActorType, BrokerMetrics};
use crate::registry::{ResourceRegistry, TransportRole};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::messages::{ConsumeReply, ProducerInfo, SessionMessage};

/// Cloneable handle to a session actor.
#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    session_id: String,
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
}

impl SessionActorHandle {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Cancels the actor. Resource cleanup is the reconciler's job, not the
    /// actor's; the broker runs it on close.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub async fn rtp_capabilities(&self) -> Result<RtpCapabilities, BrokerError> {
        self.request(|respond_to| SessionMessage::RtpCapabilities { respond_to })
            .await?
    }

    pub async fn create_transport(
        &self,
        role: TransportRole,
    ) -> Result<TransportConnectInfo, BrokerError> {
        self.request(|respond_to| SessionMessage::CreateTransport { role, respond_to })
            .await?
    }

    pub async fn connect_transport(
        &self,
        role: TransportRole,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), BrokerError> {
        self.request(|respond_to| SessionMessage::ConnectTransport {
            role,
            dtls_parameters,
            respond_to,
        })
        .await?
    }

    /// Returns the new producer id.
    pub async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<String, BrokerError> {
        self.request(|respond_to| SessionMessage::Produce {
            kind,
            rtp_parameters,
            respond_to,
        })
        .await?
    }

    pub async fn consume(&self, producer_id: String) -> Result<ConsumeReply, BrokerError> {
        self.request(|respond_to| SessionMessage::Consume {
            producer_id,
            respond_to,
        })
        .await?
    }

    pub async fn resume_consumer(&self, consumer_id: String) -> Result<(), BrokerError> {
        self.request(|respond_to| SessionMessage::ResumeConsumer {
            consumer_id,
            respond_to,
        })
        .await?
    }

    pub async fn get_producers(&self) -> Result<Vec<ProducerInfo>, BrokerError> {
        self.request(|respond_to| SessionMessage::GetProducers { respond_to })
            .await
    }

    pub async fn set_rtp_capabilities(
        &self,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<(), BrokerError> {
        self.sender
            .send(SessionMessage::SetRtpCapabilities { rtp_capabilities })
            .await
            .map_err(|_| BrokerError::Internal("session actor unavailable".into()))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| BrokerError::Internal("session actor unavailable".into()))?;
        rx.await
            .map_err(|_| BrokerError::Internal("session actor dropped reply".into()))
    }
}

pub(crate) struct SessionActor {
    session_id: String,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    registry: Arc<ResourceRegistry>,
    engine: Arc<dyn MediaEngine>,
    events: EventSender,
    egress: Arc<EgressManager>,
    metrics: Arc<BrokerMetrics>,
    /// Set once the client announces its receive capabilities.
    recv_capabilities: Option<RtpCapabilities>,
}

impl SessionActor {
    pub(crate) fn spawn(
        session_id: String,
        buffer: usize,
        cancel_token: CancellationToken,
        registry: Arc<ResourceRegistry>,
        engine: Arc<dyn MediaEngine>,
        events: EventSender,
        egress: Arc<EgressManager>,
        metrics: Arc<BrokerMetrics>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer);
        let actor = Self {
            session_id: session_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            registry,
            engine,
            events,
            egress,
            metrics,
            recv_capabilities: None,
        };
        let task = tokio::spawn(actor.run());
        (
            SessionActorHandle {
                session_id,
                sender,
                cancel_token,
            },
            task,
        )
    }

    async fn run(mut self) {
        debug!(target: "broker.actor.session", session_id = %self.session_id, "session actor started");
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "broker.actor.session",
                        session_id = %self.session_id,
                        "session actor cancelled"
                    );
                    break;
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.metrics.record_message_processed(ActorType::Session);
                        }
                        None => {
                            debug!(
                                target: "broker.actor.session",
                                session_id = %self.session_id,
                                "session mailbox closed"
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::RtpCapabilities { respond_to } => {
                let _ = respond_to.send(self.engine.rtp_capabilities());
            }
            SessionMessage::CreateTransport { role, respond_to } => {
                let _ = respond_to.send(self.create_transport(role).await);
            }
            SessionMessage::ConnectTransport {
                role,
                dtls_parameters,
                respond_to,
            } => {
                let _ = respond_to.send(self.connect_transport(role, dtls_parameters).await);
            }
            SessionMessage::Produce {
                kind,
                rtp_parameters,
                respond_to,
            } => {
                let _ = respond_to.send(self.produce(kind, rtp_parameters).await);
            }
            SessionMessage::Consume {
                producer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.consume(&producer_id).await);
            }
            SessionMessage::ResumeConsumer {
                consumer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.resume_consumer(&consumer_id).await);
            }
            SessionMessage::GetProducers { respond_to } => {
                let _ = respond_to.send(self.get_producers());
            }
            SessionMessage::SetRtpCapabilities { rtp_capabilities } => {
                debug!(
                    target: "broker.actor.session",
                    session_id = %self.session_id,
                    "receive capabilities set"
                );
                self.recv_capabilities = Some(rtp_capabilities);
            }
        }
    }

    async fn create_transport(
        &self,
        role: TransportRole,
    ) -> Result<TransportConnectInfo, BrokerError> {
        let transport = self.engine.create_webrtc_transport().await?;
        let info = transport.connect_info();
        let replaced = self
            .registry
            .register_transport(&self.session_id, role, transport);
        if replaced.is_some() {
            debug!(
                target: "broker.actor.session",
                session_id = %self.session_id,
                %role,
                "replaced existing transport"
            );
        }
        info!(
            target: "broker.actor.session",
            session_id = %self.session_id,
            transport_id = %info.id,
            %role,
            "transport created"
        );
        Ok(info)
    }

    async fn connect_transport(
        &self,
        role: TransportRole,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), BrokerError> {
        let transport = self
            .registry
            .transport(&self.session_id, role)
            .ok_or_else(|| {
                BrokerError::TransportNotFound(format!(
                    "{role} transport for session {}",
                    self.session_id
                ))
            })?;
        transport.connect(dtls_parameters).await
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<String, BrokerError> {
        let transport = self
            .registry
            .transport(&self.session_id, TransportRole::Producer)
            .ok_or_else(|| {
                BrokerError::TransportNotFound(format!(
                    "producer transport for session {}",
                    self.session_id
                ))
            })?;

        let producer = transport.produce(kind, rtp_parameters).await?;
        // Some engines create producers paused depending on negotiated
        // parameters; flowing is part of the produce contract.
        if producer.paused() {
            producer.resume().await?;
        }
        let producer_id = producer.id();

        if let Some(old) = self
            .registry
            .register_producer(&self.session_id, kind, Arc::clone(&producer))
        {
            // Replaced producer was closed by the registry; a pipeline on it
            // is now stale.
            let old_id = old.id();
            if self.egress.stop(&old_id) {
                debug!(
                    target: "broker.actor.session",
                    session_id = %self.session_id,
                    producer_id = %old_id,
                    "stopped egress of replaced producer"
                );
            }
        }

        info!(
            target: "broker.actor.session",
            session_id = %self.session_id,
            producer_id = %producer_id,
            %kind,
            "producer registered"
        );
        self.events.broadcast(
            Some(self.session_id.clone()),
            BroadcastEvent::NewProducer {
                producer_id: producer_id.clone(),
                session_id: self.session_id.clone(),
                kind,
            },
        );

        if kind == MediaKind::Video {
            self.egress.start(&self.session_id, producer);
        }

        Ok(producer_id)
    }

    async fn consume(&self, producer_id: &str) -> Result<ConsumeReply, BrokerError> {
        let capabilities = self
            .recv_capabilities
            .clone()
            .ok_or(BrokerError::CapabilitiesNotSet)?;
        let transport = self
            .registry
            .transport(&self.session_id, TransportRole::Consumer)
            .ok_or_else(|| {
                BrokerError::TransportNotFound(format!(
                    "consumer transport for session {}",
                    self.session_id
                ))
            })?;
        // The producer may have been swept by a disconnect between the
        // client learning about it and this request arriving.
        self.registry
            .producer_by_id(producer_id)
            .ok_or_else(|| BrokerError::ProducerNotFound(producer_id.to_string()))?;
        if !self.engine.can_consume(producer_id, &capabilities) {
            return Err(BrokerError::Incompatible(producer_id.to_string()));
        }

        let consumer = transport.consume(producer_id, &capabilities).await?;
        let reply = ConsumeReply {
            id: consumer.id(),
            producer_id: producer_id.to_string(),
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters(),
        };
        if self
            .registry
            .register_consumer(&self.session_id, producer_id, consumer)
            .is_some()
        {
            debug!(
                target: "broker.actor.session",
                session_id = %self.session_id,
                producer_id,
                "replaced existing consumer of producer"
            );
        }
        info!(
            target: "broker.actor.session",
            session_id = %self.session_id,
            consumer_id = %reply.id,
            producer_id,
            "consumer created (paused)"
        );
        Ok(reply)
    }

    async fn resume_consumer(&self, consumer_id: &str) -> Result<(), BrokerError> {
        let consumers = self.registry.consumers_for_session(&self.session_id);
        if consumers.is_empty() {
            return Err(BrokerError::ConsumerNotFound(consumer_id.to_string()));
        }
        let Some(consumer) = consumers.iter().find(|c| c.id() == consumer_id) else {
            return Err(BrokerError::ConsumerMismatch {
                session_id: self.session_id.clone(),
                consumer_id: consumer_id.to_string(),
            });
        };
        if consumer.paused() {
            consumer.resume().await?;
            info!(
                target: "broker.actor.session",
                session_id = %self.session_id,
                consumer_id,
                "consumer resumed"
            );
        } else {
            debug!(
                target: "broker.actor.session",
                session_id = %self.session_id,
                consumer_id,
                "consumer already resumed"
            );
        }
        Ok(())
    }

    /// Producers available to this session, i.e. everyone else's.
    fn get_producers(&self) -> Vec<ProducerInfo> {
        self.registry
            .producers_except(&self.session_id)
            .into_iter()
            .map(|(producer_id, session_id, kind)| ProducerInfo {
                producer_id,
                session_id,
                kind,
            })
            .collect()
    }
}
