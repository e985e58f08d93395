//! Actor hierarchy.
//!
//! One broker actor supervises one session actor per connected client.
//! Handles are cloneable fronts over mpsc mailboxes; each request carries a
//! oneshot reply channel. Per-session operations serialize in arrival order
//! through the session's mailbox, and a session blocked on the engine never
//! stalls its siblings.

mod broker;
mod messages;
mod session;

pub use broker::{BrokerActorHandle, BrokerStatus};
pub use messages::{ConsumeReply, ProducerInfo, StreamerInfo};
pub use session::SessionActorHandle;
