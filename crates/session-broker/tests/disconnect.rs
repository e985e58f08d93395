//! Disconnect reconciliation tests: a vanished session leaves nothing
//! behind, regardless of how far it got.

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
    let engine = MockMediaEngine::new();
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

async fn wait_for_pipeline_count(broker: &BrokerActorHandle, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let status = broker.status().await.unwrap();
        if status.registry.pipelines == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "pipeline count never reached {expected}, status: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A session that has gone through the whole lifecycle: both transports,
/// audio and video producers.
async fn full_publisher(tb: &TestBroker, id: &str) -> SessionActorHandle {
    let session = tb.broker.open_session(id.to_string()).await.unwrap();
    session
        .create_transport(TransportRole::Producer)
        .await
        .unwrap();
    session
        .create_transport(TransportRole::Consumer)
        .await
        .unwrap();
    session
        .produce(MediaKind::Audio, fixtures::audio_rtp_parameters())
        .await
        .unwrap();
    session
        .produce(MediaKind::Video, fixtures::video_rtp_parameters())
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn disconnect_sweeps_every_owned_resource() {
    let tb = spawn_broker();
    let mut events = EventCollector::new(tb.broker.events());

    full_publisher(&tb, "alice").await;

    let bob = tb.broker.open_session("bob".to_string()).await.unwrap();
    bob.create_transport(TransportRole::Consumer).await.unwrap();
    bob.set_rtp_capabilities(fixtures::client_rtp_capabilities())
        .await
        .unwrap();
    for info in bob.get_producers().await.unwrap() {
        bob.consume(info.producer_id).await.unwrap();
    }

    let before = tb.broker.status().await.unwrap();
    assert_eq!(before.session_count, 2);
    assert_eq!(before.registry.transports, 3);
    assert_eq!(before.registry.producers, 2);
    assert_eq!(before.registry.consumers, 2);
    assert_eq!(before.registry.pipelines, 1);

    tb.broker.close_session("alice".to_string()).await.unwrap();

    let disconnected = events
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, BroadcastEvent::ClientDisconnected { .. })
        })
        .await
        .expect("clientDisconnected should be broadcast");
    assert_eq!(disconnected.origin.as_deref(), Some("alice"));
    assert!(matches!(
        disconnected.event,
        BroadcastEvent::ClientDisconnected { ref session_id } if session_id == "alice"
    ));

    wait_for_pipeline_count(&tb.broker, 0).await;
    let after = tb.broker.status().await.unwrap();
    assert_eq!(after.session_count, 1);
    assert_eq!(after.registry.transports, 1, "only bob's transport remains");
    assert_eq!(after.registry.producers, 0);
    assert_eq!(after.registry.pipelines, 0);

    // Both of alice's transports and producers were closed engine-side.
    assert_eq!(tb.engine.record().closed_transports().len(), 2);
    assert_eq!(tb.engine.record().closed_producers().len(), 2);
    assert!(tb.engine.live_producer_ids().is_empty());

    // Bob no longer sees any producer.
    assert!(bob.get_producers().await.unwrap().is_empty());
}

#[tokio::test]
async fn disconnect_stops_streaming_pipeline_exactly_once() {
    let tb = spawn_broker();
    let mut events = EventCollector::new(tb.broker.events());

    full_publisher(&tb, "alice").await;
    events
        .wait_for(Duration::from_secs(3), |e| {
            matches!(e, BroadcastEvent::NewStreamer { .. })
        })
        .await
        .expect("pipeline should reach streaming");

    // The only resumed consumer is the pipeline's.
    let resumed = tb.engine.record().resumed_consumers();
    assert_eq!(resumed.len(), 1);
    let egress_consumer = resumed[0].clone();

    tb.broker.close_session("alice".to_string()).await.unwrap();
    wait_for_pipeline_count(&tb.broker, 0).await;

    // The registry row disappears before the pipeline task finishes its
    // teardown; the plain transport close marks teardown complete.
    broker_test_utils::wait_until(Duration::from_secs(3), "egress teardown", || {
        tb.engine.record().closed_plain_transports().len() == 1
    })
    .await;
    assert_eq!(
        tb.engine.record().consumer_close_count(&egress_consumer),
        1,
        "egress consumer must be closed exactly once"
    );
}

#[tokio::test]
async fn disconnect_sweeps_resources_registered_by_in_flight_requests() {
    let tb = spawn_broker();

    let session = tb.broker.open_session("alice".to_string()).await.unwrap();
    session
        .create_transport(TransportRole::Producer)
        .await
        .unwrap();

    // Hold a video produce inside the engine while the session closes.
    // Cancellation lands between mailbox messages, so the produce completes
    // and registers its producer; the sweep must still catch it.
    tb.engine.set_produce_delay(Duration::from_millis(300));
    let in_flight = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .produce(MediaKind::Video, fixtures::video_rtp_parameters())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    tb.broker.close_session("alice".to_string()).await.unwrap();
    // Whether the straddling produce succeeded or not, nothing survives it.
    let _ = in_flight.await.unwrap();

    let status = tb.broker.status().await.unwrap();
    assert_eq!(status.registry.transports, 0);
    assert_eq!(status.registry.producers, 0);
    assert_eq!(status.registry.pipelines, 0);
    assert!(tb.engine.live_producer_ids().is_empty());
}

#[tokio::test]
async fn disconnect_of_bare_session_is_clean() {
    let tb = spawn_broker();
    let mut events = EventCollector::new(tb.broker.events());

    tb.broker.open_session("ghost".to_string()).await.unwrap();
    tb.broker.close_session("ghost".to_string()).await.unwrap();

    events
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, BroadcastEvent::ClientDisconnected { .. })
        })
        .await
        .expect("even a bare session announces its disconnect");

    let status = tb.broker.status().await.unwrap();
    assert_eq!(status.session_count, 0);
}

#[tokio::test]
async fn closing_unknown_session_is_not_found() {
    let tb = spawn_broker();
    let err = tb
        .broker
        .close_session("never-opened".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn session_id_is_reusable_after_close() {
    let tb = spawn_broker();
    tb.broker.open_session("s1".to_string()).await.unwrap();
    tb.broker.close_session("s1".to_string()).await.unwrap();

    let session = tb.broker.open_session("s1".to_string()).await.unwrap();
    session
        .create_transport(TransportRole::Producer)
        .await
        .unwrap();
}

#[tokio::test]
async fn operations_on_closed_session_fail() {
    let tb = spawn_broker();
    let session = tb.broker.open_session("s1".to_string()).await.unwrap();
    tb.broker.close_session("s1".to_string()).await.unwrap();

    // The actor is cancelled; give it a moment to drain.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = session.create_transport(TransportRole::Producer).await;
    assert!(result.is_err());
}
