//! Health endpoints and metrics for the broker.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{ActorType, BrokerMetrics};
