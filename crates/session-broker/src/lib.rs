//! Session Broker Library
//!
//! A session and resource lifecycle broker for a WebRTC SFU media engine.
//! The broker sits between a signaling frontend (sockets, RPC) and an opaque
//! media-routing engine, and is responsible for:
//!
//! - Per-client session lifecycle: transports, producers, consumers
//! - Capability negotiation relay between clients and the engine
//! - Live-stream egress: plain RTP into an external transcoder producing
//!   rolling-window HLS playlists
//! - Exhaustive resource reconciliation on client disconnect
//!
//! # Architecture
//!
//! The broker uses an actor model hierarchy:
//!
//! ```text
//! BrokerActor (singleton per broker instance)
//! ├── supervises N SessionActors (one per connected client)
//! │   └── owns the client's receive capabilities, runs its operations
//! ├── ResourceRegistry (shared; single source of truth for live resources)
//! └── EgressManager
//!     └── spawns one pipeline task per live video producer
//! ```
//!
//! Media never flows through the broker; the engine behind
//! [`engine::MediaEngine`] routes packets, and the broker routes lifecycle.
//!
//! # Key Design Decisions
//!
//! - **Replace, then close**: registering over an occupied registry key
//!   replaces the entry and closes the old resource under the table lock
//! - **Single teardown owner**: an egress pipeline's resources are released
//!   only by its own task; everyone else just cancels its stop token
//! - **Engine death is fatal**: the broker cancels its actor tree and the
//!   host process is expected to exit
//!
//! # Modules
//!
//! - [`actors`] - Broker and session actors
//! - [`config`] - Configuration from environment
//! - [`egress`] - HLS egress pipelines
//! - [`engine`] - Media engine abstraction
//! - [`errors`] - Error types with client-safe classification
//! - [`events`] - Client broadcast events
//! - [`observability`] - Health endpoints and metrics
//! - [`reconcile`] - Disconnect reconciliation
//! - [`registry`] - Keyed resource tables

pub mod actors;
pub mod config;
pub mod egress;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod reconcile;
pub mod registry;

pub use actors::{BrokerActorHandle, BrokerStatus, ConsumeReply, ProducerInfo, StreamerInfo};
pub use config::Config;
pub use errors::{BrokerError, ErrorKind};
