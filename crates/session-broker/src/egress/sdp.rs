//! SDP synthesis for the transcoder input.
//!
//! The transcoder cannot negotiate; it needs a static session description
//! naming the consumer's codec and the local UDP ports the plain transport
//! sends to.

use crate::engine::{MediaKind, RtpCodecParameters};

/// Builds a minimal receive-only session description for one media stream
/// on loopback.
#[must_use]
pub fn session_description(
    kind: MediaKind,
    codec: &RtpCodecParameters,
    rtp_port: u16,
    rtcp_port: u16,
) -> String {
    let payload_type = codec.payload_type;
    let mut rtpmap = format!("{}/{}", codec.mime_subtype(), codec.clock_rate);
    if let Some(channels) = codec.channels {
        rtpmap.push_str(&format!("/{channels}"));
    }

    format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 127.0.0.1\r\n\
         s=broker-egress\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m={kind} {rtp_port} RTP/AVP {payload_type}\r\n\
         a=rtpmap:{payload_type} {rtpmap}\r\n\
         a=rtcp:{rtcp_port}\r\n\
         a=recvonly\r\n"
    )
}
