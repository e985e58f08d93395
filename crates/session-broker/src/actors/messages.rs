//! Message types for the broker and session actors.

use crate::engine::{
    DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportConnectInfo,
};
use crate::errors::BrokerError;
use crate::registry::TransportRole;
use serde::Serialize;
use tokio::sync::oneshot;

use super::session::SessionActorHandle;

/// Reply payload for a successful consume.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeReply {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// One producer as announced to other sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: String,
    #[serde(rename = "socketId")]
    pub session_id: String,
    pub kind: MediaKind,
}

/// One active egress stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamerInfo {
    /// Owning session id.
    pub id: String,
    /// Playlist URL.
    pub url: String,
}

/// Messages handled by the broker actor.
pub enum BrokerMessage {
    OpenSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<SessionActorHandle, BrokerError>>,
    },
    CloseSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },
    GetStreamers {
        respond_to: oneshot::Sender<Vec<StreamerInfo>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<super::broker::BrokerStatus>,
    },
}

/// Messages handled by a session actor.
pub enum SessionMessage {
    RtpCapabilities {
        respond_to: oneshot::Sender<Result<RtpCapabilities, BrokerError>>,
    },
    CreateTransport {
        role: TransportRole,
        respond_to: oneshot::Sender<Result<TransportConnectInfo, BrokerError>>,
    },
    ConnectTransport {
        role: TransportRole,
        dtls_parameters: DtlsParameters,
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },
    Produce {
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        respond_to: oneshot::Sender<Result<String, BrokerError>>,
    },
    Consume {
        producer_id: String,
        respond_to: oneshot::Sender<Result<ConsumeReply, BrokerError>>,
    },
    ResumeConsumer {
        consumer_id: String,
        respond_to: oneshot::Sender<Result<(), BrokerError>>,
    },
    GetProducers {
        respond_to: oneshot::Sender<Vec<ProducerInfo>>,
    },
    /// Fire-and-forget; the client announces its receive capabilities.
    SetRtpCapabilities { rtp_capabilities: RtpCapabilities },
}
