//! Broker configuration from environment variables.
//!
//! Every variable has a default so a broker can start with an empty
//! environment. Invalid values fall back to the default with a warning
//! rather than failing startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";
pub const DEFAULT_EGRESS_OUTPUT_ROOT: &str = "./egress";
pub const DEFAULT_TRANSCODER_BIN: &str = "ffmpeg";
pub const DEFAULT_PLAYLIST_URL_BASE: &str = "/hls";
pub const DEFAULT_RESUME_DELAY_MS: u64 = 3_000;
pub const DEFAULT_SEGMENT_SECONDS: u32 = 2;
pub const DEFAULT_SEGMENT_WINDOW: u32 = 5;
pub const DEFAULT_RTP_PORT_MIN: u16 = 32_768;
pub const DEFAULT_RTP_PORT_MAX: u16 = 60_999;
pub const DEFAULT_SESSION_CHANNEL_BUFFER: usize = 200;
pub const DEFAULT_BROKER_CHANNEL_BUFFER: usize = 1_000;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Egress pipeline settings.
#[derive(Debug, Clone)]
pub struct EgressConfig {
    /// Root directory for per-producer HLS output directories.
    pub output_root: PathBuf,
    /// Transcoder binary, e.g. `ffmpeg`.
    pub transcoder_bin: PathBuf,
    /// URL prefix clients use to reach playlists.
    pub playlist_url_base: String,
    /// Wait after spawning the transcoder before resuming the consumer, so
    /// the process has its UDP sockets bound when media starts flowing.
    pub resume_delay: Duration,
    /// Target HLS segment duration in seconds.
    pub segment_seconds: u32,
    /// Number of segments kept in the rolling playlist window.
    pub segment_window: u32,
    /// Inclusive lower bound of the RTP port range.
    pub rtp_port_min: u16,
    /// Inclusive upper bound of the RTP port range.
    pub rtp_port_max: u16,
}

/// Top-level broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique id for this broker instance.
    pub broker_id: String,
    /// Bind address for the health endpoint server.
    pub health_bind_address: String,
    pub egress: EgressConfig,
    /// Mailbox size for each session actor.
    pub session_channel_buffer: usize,
    /// Mailbox size for the broker actor.
    pub broker_channel_buffer: usize,
    /// Capacity of the client event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit variable map (testable).
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let broker_id = vars
            .get("BROKER_ID")
            .cloned()
            .unwrap_or_else(generate_broker_id);

        let health_bind_address = vars
            .get("BROKER_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let rtp_port_min = parse_or(vars, "BROKER_RTP_PORT_MIN", DEFAULT_RTP_PORT_MIN);
        let rtp_port_max = parse_or(vars, "BROKER_RTP_PORT_MAX", DEFAULT_RTP_PORT_MAX);
        let (rtp_port_min, rtp_port_max) = if rtp_port_min < rtp_port_max {
            (rtp_port_min, rtp_port_max)
        } else {
            warn!(
                rtp_port_min,
                rtp_port_max, "invalid RTP port range, using defaults"
            );
            (DEFAULT_RTP_PORT_MIN, DEFAULT_RTP_PORT_MAX)
        };

        let egress = EgressConfig {
            output_root: vars
                .get("BROKER_EGRESS_OUTPUT_ROOT")
                .map_or_else(|| PathBuf::from(DEFAULT_EGRESS_OUTPUT_ROOT), PathBuf::from),
            transcoder_bin: vars
                .get("BROKER_TRANSCODER_BIN")
                .map_or_else(|| PathBuf::from(DEFAULT_TRANSCODER_BIN), PathBuf::from),
            playlist_url_base: vars
                .get("BROKER_PLAYLIST_URL_BASE")
                .cloned()
                .unwrap_or_else(|| DEFAULT_PLAYLIST_URL_BASE.to_string()),
            resume_delay: Duration::from_millis(parse_or(
                vars,
                "BROKER_EGRESS_RESUME_DELAY_MS",
                DEFAULT_RESUME_DELAY_MS,
            )),
            segment_seconds: parse_or(
                vars,
                "BROKER_EGRESS_SEGMENT_SECONDS",
                DEFAULT_SEGMENT_SECONDS,
            ),
            segment_window: parse_or(vars, "BROKER_EGRESS_SEGMENT_WINDOW", DEFAULT_SEGMENT_WINDOW),
            rtp_port_min,
            rtp_port_max,
        };

        Self {
            broker_id,
            health_bind_address,
            egress,
            session_channel_buffer: parse_or(
                vars,
                "BROKER_SESSION_CHANNEL_BUFFER",
                DEFAULT_SESSION_CHANNEL_BUFFER,
            ),
            broker_channel_buffer: parse_or(
                vars,
                "BROKER_CHANNEL_BUFFER",
                DEFAULT_BROKER_CHANNEL_BUFFER,
            ),
            event_channel_capacity: parse_or(
                vars,
                "BROKER_EVENT_CHANNEL_CAPACITY",
                DEFAULT_EVENT_CHANNEL_CAPACITY,
            ),
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> T {
    match vars.get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = raw.as_str(), "invalid value, using default");
            default
        }),
    }
}

fn generate_broker_id() -> String {
    let short_uuid = Uuid::new_v4().to_string().chars().take(8).collect::<String>();
    format!("broker-{short_uuid}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_empty_environment() {
        let config = Config::from_vars(&HashMap::new());
        assert!(config.broker_id.starts_with("broker-"));
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.egress.transcoder_bin, PathBuf::from("ffmpeg"));
        assert_eq!(config.egress.playlist_url_base, "/hls");
        assert_eq!(
            config.egress.resume_delay,
            Duration::from_millis(DEFAULT_RESUME_DELAY_MS)
        );
        assert_eq!(config.egress.segment_seconds, DEFAULT_SEGMENT_SECONDS);
        assert_eq!(config.egress.segment_window, DEFAULT_SEGMENT_WINDOW);
        assert_eq!(config.egress.rtp_port_min, DEFAULT_RTP_PORT_MIN);
        assert_eq!(config.egress.rtp_port_max, DEFAULT_RTP_PORT_MAX);
        assert_eq!(config.session_channel_buffer, DEFAULT_SESSION_CHANNEL_BUFFER);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let vars: HashMap<String, String> = [
            ("BROKER_ID", "broker-test-1"),
            ("BROKER_HEALTH_BIND_ADDRESS", "127.0.0.1:9000"),
            ("BROKER_TRANSCODER_BIN", "/usr/local/bin/ffmpeg"),
            ("BROKER_EGRESS_RESUME_DELAY_MS", "500"),
            ("BROKER_EGRESS_SEGMENT_SECONDS", "4"),
            ("BROKER_RTP_PORT_MIN", "40000"),
            ("BROKER_RTP_PORT_MAX", "40100"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::from_vars(&vars);
        assert_eq!(config.broker_id, "broker-test-1");
        assert_eq!(config.health_bind_address, "127.0.0.1:9000");
        assert_eq!(
            config.egress.transcoder_bin,
            PathBuf::from("/usr/local/bin/ffmpeg")
        );
        assert_eq!(config.egress.resume_delay, Duration::from_millis(500));
        assert_eq!(config.egress.segment_seconds, 4);
        assert_eq!(config.egress.rtp_port_min, 40_000);
        assert_eq!(config.egress.rtp_port_max, 40_100);
    }

    #[test]
    fn invalid_numeric_value_falls_back_to_default() {
        let vars: HashMap<String, String> = [(
            "BROKER_EGRESS_SEGMENT_SECONDS".to_string(),
            "not-a-number".to_string(),
        )]
        .into_iter()
        .collect();
        let config = Config::from_vars(&vars);
        assert_eq!(config.egress.segment_seconds, DEFAULT_SEGMENT_SECONDS);
    }

    #[test]
    fn inverted_port_range_falls_back_to_default() {
        let vars: HashMap<String, String> = [
            ("BROKER_RTP_PORT_MIN".to_string(), "50000".to_string()),
            ("BROKER_RTP_PORT_MAX".to_string(), "40000".to_string()),
        ]
        .into_iter()
        .collect();
        let config = Config::from_vars(&vars);
        assert_eq!(config.egress.rtp_port_min, DEFAULT_RTP_PORT_MIN);
        assert_eq!(config.egress.rtp_port_max, DEFAULT_RTP_PORT_MAX);
    }
}
