//! In-memory mock of the media engine traits.
//!
//! Resources behave per the engine contract: consumers are created paused,
//! `close()` is synchronous and resources reject calls after close. Every
//! close/resume call is recorded (unguarded, so tests can detect double
//! closes) and live producers are tracked so `can_consume` and plain
//! transport consumption behave like the real engine.

use async_trait::async_trait;
use session_broker::engine::{
    Consumer, DtlsParameters, IceCandidate, IceParameters, MediaEngine, MediaKind, PlainTransport,
    Producer, RtpCapabilities, RtpParameters, TransportConnectInfo, WebRtcTransport,
};
use session_broker::errors::BrokerError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

use crate::fixtures;

/// Record of engine calls, shared by all resources of one mock engine.
#[derive(Debug, Default)]
pub struct EngineRecord {
    closed_transports: Mutex<Vec<String>>,
    closed_plain_transports: Mutex<Vec<String>>,
    closed_producers: Mutex<Vec<String>>,
    closed_consumers: Mutex<Vec<String>>,
    resumed_consumers: Mutex<Vec<String>>,
    resumed_producers: Mutex<Vec<String>>,
    plain_connects: Mutex<Vec<(IpAddr, u16, u16)>>,
}

impl EngineRecord {
    pub fn closed_transports(&self) -> Vec<String> {
        self.closed_transports.lock().unwrap().clone()
    }

    pub fn closed_plain_transports(&self) -> Vec<String> {
        self.closed_plain_transports.lock().unwrap().clone()
    }

    pub fn closed_producers(&self) -> Vec<String> {
        self.closed_producers.lock().unwrap().clone()
    }

    pub fn closed_consumers(&self) -> Vec<String> {
        self.closed_consumers.lock().unwrap().clone()
    }

    pub fn resumed_consumers(&self) -> Vec<String> {
        self.resumed_consumers.lock().unwrap().clone()
    }

    pub fn resumed_producers(&self) -> Vec<String> {
        self.resumed_producers.lock().unwrap().clone()
    }

    pub fn plain_connects(&self) -> Vec<(IpAddr, u16, u16)> {
        self.plain_connects.lock().unwrap().clone()
    }

    /// How many times `close()` was attempted on the given consumer.
    pub fn consumer_close_count(&self, consumer_id: &str) -> usize {
        self.closed_consumers
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == consumer_id)
            .count()
    }
}

struct EngineInner {
    capabilities: RtpCapabilities,
    initialized: AtomicBool,
    allow_consume: AtomicBool,
    produce_paused: AtomicBool,
    fail_webrtc_transport: AtomicBool,
    fail_plain_transport: AtomicBool,
    produce_delay_ms: AtomicU64,
    /// Live producers by id, removed on producer close.
    producers: Mutex<HashMap<String, MediaKind>>,
    record: Arc<EngineRecord>,
    died_tx: watch::Sender<bool>,
    died_rx: watch::Receiver<bool>,
}

/// Cloneable mock engine; clones share all state.
#[derive(Clone)]
pub struct MockMediaEngine {
    inner: Arc<EngineInner>,
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaEngine {
    /// An initialized engine that accepts everything.
    pub fn new() -> Self {
        let (died_tx, died_rx) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                capabilities: fixtures::engine_rtp_capabilities(),
                initialized: AtomicBool::new(true),
                allow_consume: AtomicBool::new(true),
                produce_paused: AtomicBool::new(false),
                fail_webrtc_transport: AtomicBool::new(false),
                fail_plain_transport: AtomicBool::new(false),
                produce_delay_ms: AtomicU64::new(0),
                producers: Mutex::new(HashMap::new()),
                record: Arc::new(EngineRecord::default()),
                died_tx,
                died_rx,
            }),
        }
    }

    /// An engine whose worker has not come up yet.
    pub fn uninitialized() -> Self {
        let engine = Self::new();
        engine.inner.initialized.store(false, Ordering::SeqCst);
        engine
    }

    pub fn record(&self) -> Arc<EngineRecord> {
        Arc::clone(&self.inner.record)
    }

    pub fn set_allow_consume(&self, allow: bool) {
        self.inner.allow_consume.store(allow, Ordering::SeqCst);
    }

    /// Makes subsequent producers start paused, as some negotiated
    /// parameters cause in real engines.
    pub fn set_produce_paused(&self, paused: bool) {
        self.inner.produce_paused.store(paused, Ordering::SeqCst);
    }

    pub fn set_fail_webrtc_transport(&self, fail: bool) {
        self.inner.fail_webrtc_transport.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_plain_transport(&self, fail: bool) {
        self.inner.fail_plain_transport.store(fail, Ordering::SeqCst);
    }

    /// Makes `produce` on WebRTC transports take this long, so tests can
    /// hold a produce in flight across another operation.
    pub fn set_produce_delay(&self, delay: std::time::Duration) {
        self.inner
            .produce_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Producer ids the engine still considers live.
    pub fn live_producer_ids(&self) -> Vec<String> {
        self.inner.producers.lock().unwrap().keys().cloned().collect()
    }

    /// Simulates the engine worker dying.
    pub fn trigger_worker_death(&self) {
        let _ = self.inner.died_tx.send(true);
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    fn rtp_capabilities(&self) -> Result<RtpCapabilities, BrokerError> {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return Err(BrokerError::NotInitialized);
        }
        Ok(self.inner.capabilities.clone())
    }

    async fn create_webrtc_transport(&self) -> Result<Arc<dyn WebRtcTransport>, BrokerError> {
        if self.inner.fail_webrtc_transport.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("injected transport failure".into()));
        }
        Ok(Arc::new(MockWebRtcTransport {
            id: Uuid::new_v4().to_string(),
            engine: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    async fn create_plain_transport(&self) -> Result<Arc<dyn PlainTransport>, BrokerError> {
        if self.inner.fail_plain_transport.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("injected plain transport failure".into()));
        }
        Ok(Arc::new(MockPlainTransport {
            id: Uuid::new_v4().to_string(),
            engine: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }

    fn can_consume(&self, producer_id: &str, _rtp_capabilities: &RtpCapabilities) -> bool {
        self.inner.allow_consume.load(Ordering::SeqCst)
            && self.inner.producers.lock().unwrap().contains_key(producer_id)
    }

    fn died(&self) -> watch::Receiver<bool> {
        self.inner.died_rx.clone()
    }
}

fn make_consumer(
    engine: &Arc<EngineInner>,
    producer_id: &str,
) -> Result<Arc<dyn Consumer>, BrokerError> {
    let kind = engine
        .producers
        .lock()
        .unwrap()
        .get(producer_id)
        .copied()
        .ok_or_else(|| BrokerError::Engine(format!("no live producer {producer_id}")))?;
    Ok(Arc::new(MockConsumer {
        id: Uuid::new_v4().to_string(),
        producer_id: producer_id.to_string(),
        kind,
        paused: AtomicBool::new(true),
        closed: AtomicBool::new(false),
        engine: Arc::clone(engine),
    }))
}

struct MockWebRtcTransport {
    id: String,
    engine: Arc<EngineInner>,
    closed: AtomicBool,
}

#[async_trait]
impl WebRtcTransport for MockWebRtcTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn connect_info(&self) -> TransportConnectInfo {
        TransportConnectInfo {
            id: self.id.clone(),
            ice_parameters: IceParameters(serde_json::json!({
                "usernameFragment": "mock-ufrag",
                "password": "mock-pwd"
            })),
            ice_candidates: vec![IceCandidate(serde_json::json!({
                "ip": "127.0.0.1",
                "port": 4443,
                "protocol": "udp"
            }))],
            dtls_parameters: DtlsParameters(serde_json::json!({
                "role": "auto",
                "fingerprints": []
            })),
        }
    }

    async fn connect(&self, _dtls_parameters: DtlsParameters) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("transport closed".into()));
        }
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp_parameters: RtpParameters,
    ) -> Result<Arc<dyn Producer>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("transport closed".into()));
        }
        let delay = self.engine.produce_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        let id = Uuid::new_v4().to_string();
        self.engine.producers.lock().unwrap().insert(id.clone(), kind);
        Ok(Arc::new(MockProducer {
            id,
            kind,
            paused: AtomicBool::new(self.engine.produce_paused.load(Ordering::SeqCst)),
            closed: AtomicBool::new(false),
            engine: Arc::clone(&self.engine),
        }))
    }

    async fn consume(
        &self,
        producer_id: &str,
        _rtp_capabilities: &RtpCapabilities,
    ) -> Result<Arc<dyn Consumer>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("transport closed".into()));
        }
        make_consumer(&self.engine, producer_id)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.engine
            .record
            .closed_transports
            .lock()
            .unwrap()
            .push(self.id.clone());
    }
}

struct MockPlainTransport {
    id: String,
    engine: Arc<EngineInner>,
    closed: AtomicBool,
}

#[async_trait]
impl PlainTransport for MockPlainTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn connect(
        &self,
        ip: IpAddr,
        rtp_port: u16,
        rtcp_port: u16,
    ) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("transport closed".into()));
        }
        self.engine
            .record
            .plain_connects
            .lock()
            .unwrap()
            .push((ip, rtp_port, rtcp_port));
        Ok(())
    }

    async fn consume(
        &self,
        producer_id: &str,
        _rtp_capabilities: &RtpCapabilities,
    ) -> Result<Arc<dyn Consumer>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("transport closed".into()));
        }
        make_consumer(&self.engine, producer_id)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.engine
            .record
            .closed_plain_transports
            .lock()
            .unwrap()
            .push(self.id.clone());
    }
}

struct MockProducer {
    id: String,
    kind: MediaKind,
    paused: AtomicBool,
    closed: AtomicBool,
    engine: Arc<EngineInner>,
}

#[async_trait]
impl Producer for MockProducer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("producer closed".into()));
        }
        self.paused.store(false, Ordering::SeqCst);
        self.engine
            .record
            .resumed_producers
            .lock()
            .unwrap()
            .push(self.id.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.engine.producers.lock().unwrap().remove(&self.id);
        self.engine
            .record
            .closed_producers
            .lock()
            .unwrap()
            .push(self.id.clone());
    }
}

struct MockConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    paused: AtomicBool,
    closed: AtomicBool,
    engine: Arc<EngineInner>,
}

#[async_trait]
impl Consumer for MockConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn producer_id(&self) -> String {
        self.producer_id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> RtpParameters {
        fixtures::rtp_parameters(self.kind)
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Engine("consumer closed".into()));
        }
        self.paused.store(false, Ordering::SeqCst);
        self.engine
            .record
            .resumed_consumers
            .lock()
            .unwrap()
            .push(self.id.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.engine
            .record
            .closed_consumers
            .lock()
            .unwrap()
            .push(self.id.clone());
    }
}
