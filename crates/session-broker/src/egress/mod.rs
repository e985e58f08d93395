//! Egress pipelines: plain RTP out of the engine, HLS out of a transcoder.
//!
//! Each live video producer gets at most one pipeline. A pipeline walks
//! through transport creation, paused consumption, UDP port binding, SDP
//! synthesis and transcoder spawn, then resumes the consumer and streams
//! until either the owning session disconnects or the process exits.

mod manager;
mod pipeline;
mod ports;
mod sdp;
mod transcode;

pub use manager::EgressManager;
pub use pipeline::EgressHandle;
