//! Error types for the session broker.
//!
//! Every client-facing operation funnels failures through [`BrokerError`].
//! The signaling layer is expected to map an error to a structured reply via
//! [`BrokerError::kind`] and [`BrokerError::client_message`] rather than
//! leaking internal detail to clients.

use thiserror::Error;

/// Coarse classification of broker errors, stable across variants.
///
/// This is what a signaling frontend should branch on when building an
/// error reply for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The media engine worker is not up yet.
    NotInitialized,
    /// A referenced session, transport, producer or consumer does not exist.
    NotFound,
    /// The referenced resource exists but does not match the caller's claim.
    Mismatch,
    /// The operation requires state the session has not established yet.
    NotReady,
    /// Capability negotiation failed for the requested media.
    Incompatible,
    /// An external transcoder process failed to spawn or died unexpectedly.
    ExternalProcessFailure,
    /// A bounded resource (e.g. the RTP port range) is exhausted.
    ResourceExhaustion,
    /// Anything else; a bug or an engine-level failure.
    Internal,
}

impl ErrorKind {
    /// Stable string form, suitable for structured error replies and metrics
    /// labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::NotFound => "NOT_FOUND",
            Self::Mismatch => "MISMATCH",
            Self::NotReady => "NOT_READY",
            Self::Incompatible => "INCOMPATIBLE",
            Self::ExternalProcessFailure => "EXTERNAL_PROCESS_FAILURE",
            Self::ResourceExhaustion => "RESOURCE_EXHAUSTION",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Errors produced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The media engine worker has not been initialized.
    #[error("media engine not initialized")]
    NotInitialized,

    /// No session is registered under the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session has no transport in the requested role.
    #[error("transport not found: {0}")]
    TransportNotFound(String),

    /// No producer is registered under the given id.
    #[error("producer not found: {0}")]
    ProducerNotFound(String),

    /// The session has no consumers at all.
    #[error("consumer not found: {0}")]
    ConsumerNotFound(String),

    /// The session has consumers, but none with the given id.
    #[error("consumer id mismatch for session {session_id}: {consumer_id}")]
    ConsumerMismatch {
        session_id: String,
        consumer_id: String,
    },

    /// The client has not announced its receive capabilities yet.
    #[error("client rtp capabilities not set")]
    CapabilitiesNotSet,

    /// The client cannot consume the producer with its announced capabilities.
    #[error("cannot consume producer {0}: incompatible rtp capabilities")]
    Incompatible(String),

    /// Spawning or running the external transcoder failed.
    #[error("external process failure: {0}")]
    ExternalProcess(String),

    /// No usable UDP port pair could be allocated for plain RTP egress.
    #[error("port allocation failed: {0}")]
    PortAllocation(String),

    /// A media engine call failed.
    #[error("media engine error: {0}")]
    Engine(String),

    /// Internal invariant violation or infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// The coarse [`ErrorKind`] this error maps to in client replies.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::SessionNotFound(_)
            | Self::TransportNotFound(_)
            | Self::ProducerNotFound(_)
            | Self::ConsumerNotFound(_) => ErrorKind::NotFound,
            Self::ConsumerMismatch { .. } => ErrorKind::Mismatch,
            Self::CapabilitiesNotSet => ErrorKind::NotReady,
            Self::Incompatible(_) => ErrorKind::Incompatible,
            Self::ExternalProcess(_) => ErrorKind::ExternalProcessFailure,
            Self::PortAllocation(_) => ErrorKind::ResourceExhaustion,
            Self::Engine(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Client-safe message. Internal and engine failures are collapsed to a
    /// generic string so engine internals never reach clients.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Engine(_) | Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
