//! Shared test utilities for the session broker.
//!
//! Provides what integration tests need to exercise the broker without a
//! real SFU engine or transcoder:
//!
//! - [`MockMediaEngine`]: an in-memory [`session_broker::engine::MediaEngine`]
//!   with failure injection and a call record
//! - [`fixtures`]: canned RTP parameters, capabilities and configs
//! - [`EventCollector`]: awaits broadcast events with a timeout
//! - [`transcoder`]: shell-script stand-ins for the transcoder binary
//!
//! This crate is a dev-dependency of `session-broker` only; nothing here
//! ships in production builds.

pub mod fixtures;
pub mod transcoder;

mod events;
mod mock_engine;

pub use events::EventCollector;
pub use mock_engine::{EngineRecord, MockMediaEngine};

use std::time::Duration;

/// Polls `pred` until it holds or `timeout` elapses. Useful when the
/// observable effect trails the operation, e.g. a pipeline task tearing
/// down after its registry row is already gone.
///
/// # Panics
///
/// Panics with `what` in the message when the deadline passes.
pub async fn wait_until(timeout: Duration, what: &str, pred: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !pred() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
