use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use auscult_node::broker::client::InboundMessage;
use auscult_node::config::Config;
use auscult_node::inference::InferenceEngine;
use auscult_node::persist::store::PersistStore;
use auscult_node::service::AuscultService;
use auscult_node::testing::mocks::{start_pcg_payload, topic, MemoryStore};

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    check()
}

#[test]
fn service_feeds_broker_messages_through_the_dispatcher() {
    let store = Arc::new(MemoryStore::new());
    let engine = InferenceEngine::demo().expect("engine");
    let mut cfg = Config::default();
    cfg.stream.metrics_update_hz = 0.0;

    let mut service =
        AuscultService::new(cfg, store.clone() as Arc<dyn PersistStore>, engine);
    service.start();
    let tx = service.sender();

    tx.send(InboundMessage {
        topic: topic("org-1", "dev-7", "sess-s", "heartbeat"),
        payload: b"{}".to_vec(),
    })
    .expect("send heartbeat");
    tx.send(InboundMessage {
        topic: topic("org-1", "dev-7", "sess-s", "meta"),
        payload: start_pcg_payload("sess-s", "AV", 22_050),
    })
    .expect("send start");

    assert!(wait_until(Duration::from_secs(5), || {
        !store.device_seen().is_empty() && !store.statuses_for("sess-s").is_empty()
    }));

    let status = service.status();
    assert!(status.demo_mode);
    assert!(!status.broker_connected);
    assert_eq!(status.active_buffers, 1);
    assert_eq!(status.buffer_stats.len(), 1);
    assert_eq!(status.buffer_stats[0].session_id, "sess-s");

    service.shutdown(Duration::from_secs(5));
}

#[test]
fn shutdown_without_traffic_is_clean() {
    let store = Arc::new(MemoryStore::new());
    let engine = InferenceEngine::demo().expect("engine");
    let mut service = AuscultService::new(
        Config::default(),
        store as Arc<dyn PersistStore>,
        engine,
    );
    service.start();
    service.shutdown(Duration::from_secs(5));
}
