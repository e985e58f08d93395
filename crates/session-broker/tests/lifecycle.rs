//! Session lifecycle integration tests: transports, producers, consumers
//! and the per-session operation surface, against the mock engine.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use broker_test_utils::{fixtures, transcoder, EventCollector, MockMediaEngine};
use session_broker::actors::SessionActorHandle;
use session_broker::engine::MediaKind;
use session_broker::events::BroadcastEvent;
use session_broker::observability::BrokerMetrics;
use session_broker::registry::TransportRole;
use session_broker::{BrokerActorHandle, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct TestBroker {
    broker: BrokerActorHandle,
    engine: MockMediaEngine,
    _out: TempDir,
    _transcoder: transcoder::StubTranscoder,
}

fn spawn_broker() -> TestBroker {
    spawn_broker_with(MockMediaEngine::new())
}

fn spawn_broker_with(engine: MockMediaEngine) -> TestBroker {
    let out = tempfile::tempdir().unwrap();
    let stub = transcoder::long_running();
    let config = fixtures::test_config(out.path(), stub.path());
    let broker = BrokerActorHandle::new(config, Arc::new(engine.clone()), BrokerMetrics::new());
    TestBroker {
        broker,
        engine,
        _out: out,
        _transcoder: stub,
    }
}

/// Opens a session with a connected producer transport.
async fn publisher(tb: &TestBroker, id: &str) -> SessionActorHandle {
    let session = tb.broker.open_session(id.to_string()).await.unwrap();
    session
        .create_transport(TransportRole::Producer)
        .await
        .unwrap();
    session
}

/// Opens a session ready to consume: consumer transport plus capabilities.
async fn subscriber(tb: &TestBroker, id: &str) -> SessionActorHandle {
    let session = tb.broker.open_session(id.to_string()).await.unwrap();
    session
        .create_transport(TransportRole::Consumer)
        .await
        .unwrap();
    session
        .set_rtp_capabilities(fixtures::client_rtp_capabilities())
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn full_publish_subscribe_flow() {
    let tb = spawn_broker();
    let mut events = EventCollector::new(tb.broker.events());

    let alice = publisher(&tb, "alice").await;
    let caps = alice.rtp_capabilities().await.unwrap();
    assert_eq!(caps, fixtures::engine_rtp_capabilities());

    let connect_info = alice.create_transport(TransportRole::Consumer).await.unwrap();
    assert!(!connect_info.id.is_empty());
    alice
        .connect_transport(TransportRole::Producer, Default::default())
        .await
        .unwrap();

    let producer_id = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();

    let announced = events
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, BroadcastEvent::NewProducer { kind: MediaKind::Audio, .. })
        })
        .await
        .expect("newProducer should be broadcast");
    assert_eq!(announced.origin.as_deref(), Some("alice"));
    match announced.event {
        BroadcastEvent::NewProducer {
            producer_id: ref id,
            ref session_id,
            ..
        } => {
            assert_eq!(id, &producer_id);
            assert_eq!(session_id, "alice");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let bob = subscriber(&tb, "bob").await;
    let available = bob.get_producers().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].producer_id, producer_id);
    assert_eq!(available[0].session_id, "alice");
    assert_eq!(available[0].kind, MediaKind::Audio);

    let reply = bob.consume(producer_id.clone()).await.unwrap();
    assert_eq!(reply.producer_id, producer_id);
    assert_eq!(reply.kind, MediaKind::Audio);
    assert_eq!(reply.rtp_parameters.codecs[0].mime_type, "audio/opus");

    bob.resume_consumer(reply.id.clone()).await.unwrap();
    assert_eq!(tb.engine.record().resumed_consumers(), vec![reply.id]);
}

#[tokio::test]
async fn create_transport_replaces_and_closes_old() {
    let tb = spawn_broker();
    let session = publisher(&tb, "s1").await;

    let second = session
        .create_transport(TransportRole::Producer)
        .await
        .unwrap();

    let closed = tb.engine.record().closed_transports();
    assert_eq!(closed.len(), 1, "first transport should be closed");
    assert_ne!(closed[0], second.id);

    // The survivor still works.
    session
        .connect_transport(TransportRole::Producer, Default::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn produce_same_kind_replaces_and_closes_old() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;

    let first = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();
    let second = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();
    assert_ne!(first, second);

    assert_eq!(tb.engine.record().closed_producers(), vec![first]);
    assert_eq!(tb.engine.live_producer_ids(), vec![second.clone()]);

    let bob = subscriber(&tb, "bob").await;
    let available = bob.get_producers().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].producer_id, second);
}

#[tokio::test]
async fn produce_resumes_paused_producer() {
    let tb = spawn_broker();
    tb.engine.set_produce_paused(true);
    let alice = publisher(&tb, "alice").await;

    alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();
    assert_eq!(tb.engine.record().resumed_producers().len(), 1);
}

#[tokio::test]
async fn consume_twice_replaces_and_closes_old_consumer() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    let producer_id = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();

    let bob = subscriber(&tb, "bob").await;
    let first = bob.consume(producer_id.clone()).await.unwrap();
    let second = bob.consume(producer_id).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(tb.engine.record().closed_consumers(), vec![first.id]);
}

#[tokio::test]
async fn consume_before_capabilities_is_not_ready() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    let producer_id = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();

    let bob = tb.broker.open_session("bob".to_string()).await.unwrap();
    bob.create_transport(TransportRole::Consumer).await.unwrap();

    let err = bob.consume(producer_id.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);

    // Announcing capabilities unblocks the same request.
    bob.set_rtp_capabilities(fixtures::client_rtp_capabilities())
        .await
        .unwrap();
    bob.consume(producer_id).await.unwrap();
}

#[tokio::test]
async fn consume_unknown_producer_is_not_found() {
    let tb = spawn_broker();
    let bob = subscriber(&tb, "bob").await;
    let err = bob.consume("no-such-producer".to_string()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn consume_with_incompatible_capabilities() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    let producer_id = alice
        .produce(MediaKind::Video, fixtures::video_rtp_parameters())
        .await
        .unwrap();

    tb.engine.set_allow_consume(false);
    let bob = subscriber(&tb, "bob").await;
    let err = bob.consume(producer_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);
}

#[tokio::test]
async fn operations_without_transport_are_not_found() {
    let tb = spawn_broker();
    let session = tb.broker.open_session("s1".to_string()).await.unwrap();

    let err = session
        .connect_transport(TransportRole::Producer, Default::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = session
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn resume_consumer_errors() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    let producer_id = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();

    let bob = subscriber(&tb, "bob").await;

    // No consumers yet at all.
    let err = bob.resume_consumer("c-none".to_string()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Consumers exist, but not this one.
    bob.consume(producer_id).await.unwrap();
    let err = bob.resume_consumer("c-other".to_string()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mismatch);
}

#[tokio::test]
async fn resume_consumer_is_idempotent() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    let producer_id = alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();

    let bob = subscriber(&tb, "bob").await;
    let reply = bob.consume(producer_id).await.unwrap();
    bob.resume_consumer(reply.id.clone()).await.unwrap();
    bob.resume_consumer(reply.id.clone()).await.unwrap();

    // Only the first call reaches the engine.
    assert_eq!(tb.engine.record().resumed_consumers().len(), 1);
}

#[tokio::test]
async fn get_producers_excludes_own() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();

    let own = alice.get_producers().await.unwrap();
    assert!(own.is_empty());
}

#[tokio::test]
async fn uninitialized_engine_rejects_capability_query() {
    let tb = spawn_broker_with(MockMediaEngine::uninitialized());
    let session = tb.broker.open_session("s1".to_string()).await.unwrap();
    let err = session.rtp_capabilities().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
}

#[tokio::test]
async fn duplicate_session_id_is_rejected() {
    let tb = spawn_broker();
    tb.broker.open_session("s1".to_string()).await.unwrap();
    let err = tb.broker.open_session("s1".to_string()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn engine_worker_death_shuts_the_broker_down() {
    let tb = spawn_broker();
    tb.broker.open_session("s1".to_string()).await.unwrap();

    tb.engine.trigger_worker_death();
    tokio::time::timeout(Duration::from_secs(1), tb.broker.cancelled())
        .await
        .expect("broker should cancel on engine death");
    assert!(tb.broker.is_shut_down());
}

#[tokio::test]
async fn status_reflects_sessions_and_registry() {
    let tb = spawn_broker();
    let alice = publisher(&tb, "alice").await;
    alice
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();
    subscriber(&tb, "bob").await;

    let status = tb.broker.status().await.unwrap();
    assert_eq!(status.broker_id, "broker-test");
    assert_eq!(status.session_count, 2);
    assert_eq!(status.registry.transports, 2);
    assert_eq!(status.registry.producers, 1);
}
