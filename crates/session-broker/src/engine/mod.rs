//! Media engine abstraction.
//!
//! The broker orchestrates session and resource lifecycle but never touches
//! media itself. All routing is delegated to an SFU engine behind these
//! traits; the host process supplies a concrete implementation (and tests
//! supply a mock).
//!
//! Contract notes shared by all implementations:
//!
//! - `close()` on every resource is synchronous, idempotent and infallible.
//!   Closing a transport implicitly closes everything built on it; a second
//!   `close()` anywhere is a no-op. The registry relies on this to close
//!   evicted resources while holding a table lock.
//! - Consumers are created paused and only start flowing after `resume()`.

mod types;

pub use types::{
    DtlsParameters, IceCandidate, IceParameters, MediaKind, RtpCapabilities, RtpCodecParameters,
    RtpParameters, TransportConnectInfo,
};

use crate::errors::BrokerError;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// The SFU media engine as seen by the broker.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// The engine's RTP capability set for client negotiation.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotInitialized`] until the engine worker is up.
    fn rtp_capabilities(&self) -> Result<RtpCapabilities, BrokerError>;

    /// Creates a WebRTC (ICE/DTLS) transport for client media.
    async fn create_webrtc_transport(&self) -> Result<Arc<dyn WebRtcTransport>, BrokerError>;

    /// Creates a plain RTP transport for server-side egress.
    async fn create_plain_transport(&self) -> Result<Arc<dyn PlainTransport>, BrokerError>;

    /// Whether `rtp_capabilities` suffice to consume the given producer.
    fn can_consume(&self, producer_id: &str, rtp_capabilities: &RtpCapabilities) -> bool;

    /// Observes engine worker death. The flag flips to `true` at most once
    /// and death is unrecoverable; the host process should exit.
    fn died(&self) -> watch::Receiver<bool>;
}

/// A client-facing WebRTC transport.
#[async_trait]
pub trait WebRtcTransport: Send + Sync {
    fn id(&self) -> String;

    /// ICE/DTLS bootstrap parameters to hand back to the client.
    fn connect_info(&self) -> TransportConnectInfo;

    /// Completes the DTLS handshake with client-supplied parameters.
    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<(), BrokerError>;

    /// Creates a producer for inbound client media on this transport.
    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<Arc<dyn Producer>, BrokerError>;

    /// Creates a paused consumer of `producer_id` on this transport.
    async fn consume(
        &self,
        producer_id: &str,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<Arc<dyn Consumer>, BrokerError>;

    /// Closes the transport and everything on it. Idempotent.
    fn close(&self);
}

/// A plain RTP transport used to feed media to a local process.
#[async_trait]
pub trait PlainTransport: Send + Sync {
    fn id(&self) -> String;

    /// Points the transport's RTP/RTCP output at a local address.
    async fn connect(&self, ip: IpAddr, rtp_port: u16, rtcp_port: u16)
        -> Result<(), BrokerError>;

    /// Creates a paused consumer of `producer_id` on this transport.
    async fn consume(
        &self,
        producer_id: &str,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<Arc<dyn Consumer>, BrokerError>;

    /// Closes the transport and everything on it. Idempotent.
    fn close(&self);
}

/// A media source registered with the engine.
#[async_trait]
pub trait Producer: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> MediaKind;
    fn paused(&self) -> bool;
    async fn resume(&self) -> Result<(), BrokerError>;
    /// Idempotent.
    fn close(&self);
}

/// A media sink attached to a producer.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn id(&self) -> String;
    fn producer_id(&self) -> String;
    fn kind(&self) -> MediaKind;
    /// The negotiated receive parameters, as sent back to the client.
    fn rtp_parameters(&self) -> RtpParameters;
    fn paused(&self) -> bool;
    async fn resume(&self) -> Result<(), BrokerError>;
    /// Idempotent.
    fn close(&self);
}
