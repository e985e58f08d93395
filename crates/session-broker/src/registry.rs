//! Resource registry: the single source of truth for live media resources.
//!
//! Four tables track every transport, producer, consumer and egress pipeline
//! the broker owns. All mutation goes through the registry so that lifecycle
//! invariants hold in one place:
//!
//! - Inserting under an occupied key replaces the entry and closes the old
//!   resource under the table lock, so no window exists where a key maps to
//!   a closed resource or to nothing.
//! - Removal closes the removed resource before returning it.
//!
//! Closing is safe under the lock because every engine `close()` is
//! synchronous and idempotent (see [`crate::engine`]).

use crate::egress::EgressHandle;
use crate::engine::{Consumer, MediaKind, Producer, WebRtcTransport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Resources a [`Table`] can own. `close_handle` must be idempotent.
pub trait CloseHandle {
    fn close_handle(&self);
}

impl CloseHandle for Arc<dyn WebRtcTransport> {
    fn close_handle(&self) {
        self.close();
    }
}

impl CloseHandle for Arc<dyn Producer> {
    fn close_handle(&self) {
        self.close();
    }
}

impl CloseHandle for Arc<dyn Consumer> {
    fn close_handle(&self) {
        self.close();
    }
}

impl CloseHandle for EgressHandle {
    fn close_handle(&self) {
        self.stop();
    }
}

/// Which direction a WebRTC transport serves for its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    Producer,
    Consumer,
}

impl TransportRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey {
    pub session_id: String,
    pub role: TransportRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProducerKey {
    pub session_id: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerKey {
    pub session_id: String,
    pub producer_id: String,
}

/// One keyed table of closeable resources.
pub struct Table<K, V> {
    name: &'static str,
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: CloseHandle + Clone,
{
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        // A poisoned table lock means a panic inside a close call; the map
        // itself is still coherent, so keep going with the inner value.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `value` under `key`. If the key was occupied the old entry is
    /// replaced and closed before the lock is released, and returned.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let mut entries = self.lock();
        let evicted = entries.insert(key.clone(), value);
        if let Some(old) = &evicted {
            old.close_handle();
            trace!(
                target: "broker.registry",
                table = self.name,
                key = ?key,
                "replaced and closed existing entry"
            );
        }
        evicted
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Removes and closes the entry under `key`, returning it.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.lock().remove(key);
        if let Some(value) = &removed {
            value.close_handle();
        }
        removed
    }

    /// Removes and closes every entry whose key matches `pred`.
    pub fn remove_matching(&self, pred: impl Fn(&K) -> bool) -> Vec<(K, V)> {
        let mut entries = self.lock();
        let keys: Vec<K> = entries.keys().filter(|k| pred(k)).cloned().collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = entries.remove(&key) {
                value.close_handle();
                removed.push((key, value));
            }
        }
        removed
    }

    /// Returns the first non-`None` result of `f` over the entries.
    pub fn find<T>(&self, mut f: impl FnMut(&K, &V) -> Option<T>) -> Option<T> {
        let entries = self.lock();
        entries.iter().find_map(|(k, v)| f(k, v))
    }

    /// Collects every non-`None` result of `f` over the entries.
    pub fn collect<T>(&self, mut f: impl FnMut(&K, &V) -> Option<T>) -> Vec<T> {
        let entries = self.lock();
        entries.iter().filter_map(|(k, v)| f(k, v)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Snapshot of table sizes, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCounts {
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
    pub pipelines: usize,
}

/// All live resources, keyed the way broker operations look them up.
pub struct ResourceRegistry {
    transports: Table<TransportKey, Arc<dyn WebRtcTransport>>,
    producers: Table<ProducerKey, Arc<dyn Producer>>,
    consumers: Table<ConsumerKey, Arc<dyn Consumer>>,
    pipelines: Table<String, EgressHandle>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            transports: Table::new("transports"),
            producers: Table::new("producers"),
            consumers: Table::new("consumers"),
            pipelines: Table::new("pipelines"),
        }
    }

    // --- transports ---

    pub fn register_transport(
        &self,
        session_id: &str,
        role: TransportRole,
        transport: Arc<dyn WebRtcTransport>,
    ) -> Option<Arc<dyn WebRtcTransport>> {
        self.transports.put(
            TransportKey {
                session_id: session_id.to_string(),
                role,
            },
            transport,
        )
    }

    pub fn transport(
        &self,
        session_id: &str,
        role: TransportRole,
    ) -> Option<Arc<dyn WebRtcTransport>> {
        self.transports.get(&TransportKey {
            session_id: session_id.to_string(),
            role,
        })
    }

    pub fn remove_session_transports(
        &self,
        session_id: &str,
    ) -> Vec<(TransportKey, Arc<dyn WebRtcTransport>)> {
        self.transports.remove_matching(|k| k.session_id == session_id)
    }

    // --- producers ---

    pub fn register_producer(
        &self,
        session_id: &str,
        kind: MediaKind,
        producer: Arc<dyn Producer>,
    ) -> Option<Arc<dyn Producer>> {
        self.producers.put(
            ProducerKey {
                session_id: session_id.to_string(),
                kind,
            },
            producer,
        )
    }

    pub fn producer_by_id(&self, producer_id: &str) -> Option<Arc<dyn Producer>> {
        self.producers.find(|_, p| {
            if p.id() == producer_id {
                Some(Arc::clone(p))
            } else {
                None
            }
        })
    }

    /// Producer ids owned by `session_id`, without removing anything.
    pub fn session_producer_ids(&self, session_id: &str) -> Vec<String> {
        self.producers.collect(|k, p| {
            if k.session_id == session_id {
                Some(p.id())
            } else {
                None
            }
        })
    }

    /// All producers not owned by `session_id`, as `(producer_id, owner, kind)`.
    pub fn producers_except(&self, session_id: &str) -> Vec<(String, String, MediaKind)> {
        self.producers.collect(|k, p| {
            if k.session_id == session_id {
                None
            } else {
                Some((p.id(), k.session_id.clone(), k.kind))
            }
        })
    }

    pub fn remove_session_producers(
        &self,
        session_id: &str,
    ) -> Vec<(ProducerKey, Arc<dyn Producer>)> {
        self.producers.remove_matching(|k| k.session_id == session_id)
    }

    // --- consumers ---

    pub fn register_consumer(
        &self,
        session_id: &str,
        producer_id: &str,
        consumer: Arc<dyn Consumer>,
    ) -> Option<Arc<dyn Consumer>> {
        self.consumers.put(
            ConsumerKey {
                session_id: session_id.to_string(),
                producer_id: producer_id.to_string(),
            },
            consumer,
        )
    }

    pub fn consumers_for_session(&self, session_id: &str) -> Vec<Arc<dyn Consumer>> {
        self.consumers.collect(|k, c| {
            if k.session_id == session_id {
                Some(Arc::clone(c))
            } else {
                None
            }
        })
    }

    pub fn remove_session_consumers(
        &self,
        session_id: &str,
    ) -> Vec<(ConsumerKey, Arc<dyn Consumer>)> {
        self.consumers.remove_matching(|k| k.session_id == session_id)
    }

    // --- egress pipelines ---

    pub fn register_pipeline(
        &self,
        producer_id: &str,
        handle: EgressHandle,
    ) -> Option<EgressHandle> {
        self.pipelines.put(producer_id.to_string(), handle)
    }

    /// Removes the pipeline entry and cancels it. The pipeline task itself
    /// releases the underlying resources.
    pub fn remove_pipeline(&self, producer_id: &str) -> Option<EgressHandle> {
        self.pipelines.remove(&producer_id.to_string())
    }

    /// Pipelines that have reached the streaming state.
    pub fn streaming_pipelines(&self) -> Vec<EgressHandle> {
        self.pipelines.collect(|_, h| {
            if h.is_streaming() {
                Some(h.clone())
            } else {
                None
            }
        })
    }

    #[must_use]
    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            transports: self.transports.len(),
            producers: self.producers.len(),
            consumers: self.consumers.len(),
            pipelines: self.pipelines.len(),
        }
    }

    /// True when no resource in any table references `session_id`.
    pub fn session_is_clean(&self, session_id: &str) -> bool {
        self.transports
            .find(|k, _| (k.session_id == session_id).then_some(()))
            .is_none()
            && self
                .producers
                .find(|k, _| (k.session_id == session_id).then_some(()))
                .is_none()
            && self
                .consumers
                .find(|k, _| (k.session_id == session_id).then_some(()))
                .is_none()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
