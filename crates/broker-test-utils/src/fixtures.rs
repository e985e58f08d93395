//! Canned capabilities, parameters and configs for tests.

use session_broker::config::{Config, EgressConfig};
use session_broker::engine::{MediaKind, RtpCapabilities, RtpCodecParameters, RtpParameters};
use std::path::Path;
use std::time::Duration;

/// The mock engine's capability set: opus, VP8 and H264.
pub fn engine_rtp_capabilities() -> RtpCapabilities {
    RtpCapabilities(serde_json::json!({
        "codecs": [
            {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
            {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000},
            {
                "kind": "video",
                "mimeType": "video/H264",
                "clockRate": 90000,
                "parameters": {"packetization-mode": 1}
            }
        ]
    }))
}

/// Capabilities a browser-like client would announce.
pub fn client_rtp_capabilities() -> RtpCapabilities {
    engine_rtp_capabilities()
}

pub fn video_rtp_parameters() -> RtpParameters {
    RtpParameters {
        codecs: vec![RtpCodecParameters {
            mime_type: "video/VP8".into(),
            payload_type: 101,
            clock_rate: 90_000,
            channels: None,
            parameters: serde_json::Map::new(),
        }],
        rest: serde_json::Map::new(),
    }
}

pub fn audio_rtp_parameters() -> RtpParameters {
    RtpParameters {
        codecs: vec![RtpCodecParameters {
            mime_type: "audio/opus".into(),
            payload_type: 100,
            clock_rate: 48_000,
            channels: Some(2),
            parameters: serde_json::Map::new(),
        }],
        rest: serde_json::Map::new(),
    }
}

pub fn rtp_parameters(kind: MediaKind) -> RtpParameters {
    match kind {
        MediaKind::Audio => audio_rtp_parameters(),
        MediaKind::Video => video_rtp_parameters(),
    }
}

/// A broker config tuned for tests: short resume delay, temp output root
/// and an explicit transcoder binary (usually a stub script).
pub fn test_config(output_root: &Path, transcoder_bin: &Path) -> Config {
    Config {
        broker_id: "broker-test".into(),
        health_bind_address: "127.0.0.1:0".into(),
        egress: EgressConfig {
            output_root: output_root.to_path_buf(),
            transcoder_bin: transcoder_bin.to_path_buf(),
            playlist_url_base: "/hls".into(),
            resume_delay: Duration::from_millis(100),
            segment_seconds: 2,
            segment_window: 5,
            rtp_port_min: 41_000,
            rtp_port_max: 41_999,
        },
        session_channel_buffer: 32,
        broker_channel_buffer: 64,
        event_channel_capacity: 64,
    }
}
