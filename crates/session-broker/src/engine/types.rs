//! Wire-level types exchanged with clients and the media engine.
//!
//! Capability and parameter payloads are negotiated between the client and
//! the engine; the broker relays them without interpreting their contents,
//! so most of these are transparent wrappers over raw JSON. The exception is
//! [`RtpParameters`], where the broker needs the codec list to synthesize a
//! session description for egress.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RTP capability set, opaque to the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub serde_json::Value);

/// DTLS handshake parameters, opaque to the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub serde_json::Value);

/// ICE parameters, opaque to the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceParameters(pub serde_json::Value);

/// A single ICE candidate, opaque to the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

/// One negotiated codec inside [`RtpParameters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    /// Full mime type, e.g. `video/VP8` or `audio/opus`.
    pub mime_type: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    /// Channel count; only meaningful for audio codecs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Codec-specific format parameters.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl RtpCodecParameters {
    /// The codec name without the media prefix, e.g. `VP8` for `video/VP8`.
    #[must_use]
    pub fn mime_subtype(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map_or(self.mime_type.as_str(), |(_, subtype)| subtype)
    }
}

/// Negotiated RTP parameters for a producer or consumer.
///
/// The broker only inspects `codecs`; encodings, header extensions and the
/// rest round-trip untouched via the flattened map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RtpParameters {
    pub codecs: Vec<RtpCodecParameters>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Everything a client needs to complete ICE/DTLS setup against a
/// newly created WebRTC transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConnectInfo {
    pub id: String,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}
