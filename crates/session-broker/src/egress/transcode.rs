//! Transcoder process invocation.
//!
//! Builds the ffmpeg-compatible command line that turns the SDP-described
//! RTP input into a rolling-window HLS playlist. Only the command is built
//! here; spawning and supervision live in the pipeline.

use crate::config::EgressConfig;
use crate::engine::MediaKind;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub const PLAYLIST_FILE: &str = "playlist.m3u8";
pub const SDP_FILE: &str = "stream.sdp";

/// Builds the transcoder command for one media stream.
#[must_use]
pub fn command(config: &EgressConfig, kind: MediaKind, sdp_path: &Path, out_dir: &Path) -> Command {
    let mut cmd = Command::new(&config.transcoder_bin);
    cmd.args(["-hide_banner", "-loglevel", "warning"])
        .args(["-protocol_whitelist", "file,udp,rtp"])
        .arg("-i")
        .arg(sdp_path);

    match kind {
        MediaKind::Video => {
            cmd.args([
                "-c:v",
                "libx264",
                "-preset",
                "ultrafast",
                "-tune",
                "zerolatency",
                "-g",
                "48",
                "-an",
            ]);
        }
        MediaKind::Audio => {
            cmd.args(["-c:a", "aac", "-b:a", "128k", "-vn"]);
        }
    }

    cmd.args(["-f", "hls"])
        .args(["-hls_time", &config.segment_seconds.to_string()])
        .args(["-hls_list_size", &config.segment_window.to_string()])
        .args(["-hls_flags", "delete_segments+independent_segments"])
        .arg(out_dir.join(PLAYLIST_FILE));

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::EgressConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config() -> EgressConfig {
        EgressConfig {
            output_root: PathBuf::from("/tmp/egress"),
            transcoder_bin: PathBuf::from("ffmpeg"),
            playlist_url_base: "/hls".into(),
            resume_delay: Duration::from_millis(100),
            segment_seconds: 2,
            segment_window: 5,
            rtp_port_min: 40_000,
            rtp_port_max: 41_000,
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn video_command_uses_h264_hls() {
        let cmd = command(
            &config(),
            MediaKind::Video,
            Path::new("/tmp/egress/p1/stream.sdp"),
            Path::new("/tmp/egress/p1"),
        );
        let args = args_of(&cmd);
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-tune", "zerolatency"]));
        assert!(args.windows(2).any(|w| w == ["-f", "hls"]));
        assert!(args.windows(2).any(|w| w == ["-hls_time", "2"]));
        assert!(args.windows(2).any(|w| w == ["-hls_list_size", "5"]));
        assert!(args.contains(&"-an".to_string()));
        assert!(args
            .iter()
            .any(|a| a.ends_with("p1/playlist.m3u8")));
    }

    #[test]
    fn audio_command_uses_aac() {
        let cmd = command(
            &config(),
            MediaKind::Audio,
            Path::new("/tmp/egress/p2/stream.sdp"),
            Path::new("/tmp/egress/p2"),
        );
        let args = args_of(&cmd);
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.contains(&"-vn".to_string()));
    }

    #[test]
    fn rolling_window_deletes_old_segments() {
        let cmd = command(
            &config(),
            MediaKind::Video,
            Path::new("/tmp/s.sdp"),
            Path::new("/tmp/out"),
        );
        let args = args_of(&cmd);
        assert!(args
            .windows(2)
            .any(|w| w == ["-hls_flags", "delete_segments+independent_segments"]));
    }
}
