//! End-to-end scenarios against the in-memory fake backend (spec §8 S1-S6).

use onyx_log::chunk::{ChunkKind, ChunkStore};
use onyx_log::client::Client;
use onyx_log::codec::ZstdJsonCodec;
use onyx_log::gc::GarbageCollector;
use onyx_log::monitor::RecordingSink;
use onyx_log::namespace::{bootstrap, Paths};
use onyx_log::origin::OriginManager;
use onyx_log::subscriber::{Subscriber, SubscriberEvent};
use onyx_log::writer::LogWriter;
use onyx_log_testkit::FakeBackend;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

fn harness(tenancy: &str) -> (Client<FakeBackend, ZstdJsonCodec, RecordingSink>, Paths) {
    let client = Client::new(FakeBackend::new(), ZstdJsonCodec::new(0), RecordingSink::new());
    let paths = Paths::new(tenancy);
    (client, paths)
}

async fn write_log_parameters(
    client: &Client<FakeBackend, ZstdJsonCodec, RecordingSink>,
    paths: &Paths,
) {
    let bytes = client
        .codec()
        .encode(&onyx_log::subscriber::LogParameters {
            log_version: onyx_log::subscriber::SUPPORTED_LOG_VERSION,
        })
        .unwrap();
    client
        .create(&paths.log_parameters(), Some(bytes), true, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn s1_bootstrap_creates_roots_and_origin() {
    let (client, paths) = harness("t1");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();

    for root in [
        paths.log_root(),
        paths.pulse_root(),
        paths.origin_root(),
        paths.log_parameters_root(),
        paths.task_root(),
        paths.chunk_root(),
    ] {
        assert!(client.exists(&root, None).await.unwrap().is_some());
    }

    let origin = OriginManager::new(&client, &paths);
    let snapshot = origin.read_origin::<Value>().await.unwrap();
    assert_eq!(snapshot.message_id, -1);
    assert_eq!(snapshot.replica, json!({"base": true}));
}

/// Drives a subscriber's `subscribe` future alongside reads from its output
/// channel, without requiring `'static` data (the subscriber borrows
/// `client`/`paths`, so it cannot be `tokio::spawn`ed from a test). Collects
/// events until `want` have arrived, then signals `kill` and waits for the
/// subscriber to wind down.
async fn collect_events<B, C, M>(
    subscriber: Subscriber<'_, B, C, M>,
    tx: mpsc::Sender<SubscriberEvent<Value, Value>>,
    mut rx: mpsc::Receiver<SubscriberEvent<Value, Value>>,
    kill_tx: watch::Sender<bool>,
    kill_rx: watch::Receiver<bool>,
    want: usize,
) -> Vec<SubscriberEvent<Value, Value>>
where
    B: onyx_log::client::Backend,
    C: onyx_log::codec::Codec,
    M: onyx_log::monitor::MonitorSink,
{
    let mut subscribe_fut = Box::pin(subscriber.subscribe::<Value, Value>(tx, kill_rx));
    let mut events = Vec::new();
    loop {
        tokio::select! {
            res = &mut subscribe_fut => {
                let _ = res;
                break;
            }
            Some(event) = rx.recv() => {
                events.push(event);
                if events.len() >= want {
                    let _ = kill_tx.send(true);
                }
            }
        }
    }
    events
}

#[tokio::test]
async fn s2_single_write_then_subscribe() {
    let (client, paths) = harness("t2");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();
    write_log_parameters(&client, &paths).await;

    let writer = LogWriter::new(&client, &paths);
    writer.write_log_entry(&json!({"x": 1})).await.unwrap();

    let subscriber = Subscriber::new(&client, &paths);
    let (tx, rx) = mpsc::channel(8);
    let (kill_tx, kill_rx) = watch::channel(false);

    let events = collect_events(subscriber, tx, rx, kill_tx, kill_rx, 2).await;

    assert_eq!(events.len(), 2);
    match &events[0] {
        SubscriberEvent::SetReplica(replica) => assert_eq!(*replica, json!({"base": true})),
        other => panic!("expected SetReplica first, got {other:?}"),
    }
    match &events[1] {
        SubscriberEvent::Entry(entry) => {
            assert_eq!(entry.message_id, 0);
            assert_eq!(entry.value, json!({"x": 1}));
        }
        other => panic!("expected Entry(0), got {other:?}"),
    }
}

#[tokio::test]
async fn s3_concurrent_writers_preserve_per_writer_order() {
    let (client, paths) = harness("t3");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();
    write_log_parameters(&client, &paths).await;

    let writer = LogWriter::new(&client, &paths);
    let mut a_positions = Vec::new();
    let mut b_positions = Vec::new();
    for i in 0..5 {
        let path_a = writer.write_log_entry(&json!({"writer": "a", "i": i})).await.unwrap();
        a_positions.push(path_a);
        let path_b = writer.write_log_entry(&json!({"writer": "b", "i": i})).await.unwrap();
        b_positions.push(path_b);
    }

    // Sequential suffixes are strictly increasing within each writer's own
    // call order (spec §8 property 1); the backend assigns a single global
    // sequence so interleaving across writers is by creation order.
    for window in a_positions.windows(2) {
        assert!(window[0] < window[1]);
    }
    for window in b_positions.windows(2) {
        assert!(window[0] < window[1]);
    }
}

#[tokio::test]
async fn s4_late_subscriber_after_gc_reseeks_to_origin() {
    let (client, paths) = harness("t4");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();
    write_log_parameters(&client, &paths).await;

    let writer = LogWriter::new(&client, &paths);
    for i in 0..10 {
        writer.write_log_entry(&json!({"i": i})).await.unwrap();
    }

    let origin = OriginManager::new(&client, &paths);
    origin.update_origin(json!({"replica": "v"}), 4).await.unwrap();

    let gc = GarbageCollector::new(&client, &paths);
    for position in 0i64..=4 {
        gc.gc_log_entry(position).await.unwrap();
    }

    let subscriber = Subscriber::new(&client, &paths);
    let (tx, rx) = mpsc::channel(32);
    let (kill_tx, kill_rx) = watch::channel(false);

    // 1 SetReplica + 5 entries (message_id 5..=9).
    let events = collect_events(subscriber, tx, rx, kill_tx, kill_rx, 6).await;

    match &events[0] {
        SubscriberEvent::SetReplica(replica) => {
            assert_eq!(*replica, json!({"replica": "v"}));
        }
        other => panic!("expected SetReplica first, got {other:?}"),
    }

    for (offset, expected_id) in (5i64..=9).enumerate() {
        match &events[1 + offset] {
            SubscriberEvent::Entry(entry) => assert_eq!(entry.message_id, expected_id),
            other => panic!("expected Entry({expected_id}), got {other:?}"),
        }
    }
}

/// Spec §8 property 7: deleting `entry-<p>` while a live subscriber is at
/// `position == p` re-seeks it to origin rather than getting stuck or
/// silently dropping the position. Unlike S4 (a late subscriber that starts
/// fresh past an already-GC'd range and never touches the tail loop's read
/// path), this keeps a subscriber actively tailing and races a GC against
/// the exact entry it is about to read, driving `subscriber.rs`'s
/// `try_read_entry` -> `NoNode` -> `re_seek` arm directly.
#[tokio::test]
async fn s7_gc_race_at_live_cursor_triggers_reseek() {
    let (client, paths) = harness("t7");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();
    write_log_parameters(&client, &paths).await;

    let writer = LogWriter::new(&client, &paths);
    for i in 0..3 {
        writer.write_log_entry(&json!({"i": i})).await.unwrap();
    }

    let subscriber = Subscriber::new(&client, &paths);
    // Capacity 1: once the buffer holds one undelivered event, the
    // subscriber blocks on its next send, handing control back to this test
    // between every event so the GC race can be injected at an exact point.
    let (tx, mut rx) = mpsc::channel(1);
    let (kill_tx, kill_rx) = watch::channel(false);
    let mut subscribe_fut = Box::pin(subscriber.subscribe::<Value, Value>(tx, kill_rx));

    let mut events = Vec::new();
    loop {
        tokio::select! {
            res = &mut subscribe_fut => {
                let _ = res;
                break;
            }
            Some(event) = rx.recv() => {
                events.push(event);
                match events.len() {
                    1 => {
                        // The subscriber has just emitted its initial
                        // SetReplica and is blocked delivering entry 0.
                        // Advance origin to cover position 1 (spec §3
                        // invariant 3's GC precondition) and arm the race
                        // against entry 1, the position it will reach next.
                        let origin = OriginManager::new(&client, &paths);
                        origin
                            .update_origin(json!({"replica": "after-gc"}), 1)
                            .await
                            .unwrap();
                        client.backend().simulate_gc_race(&paths.log_entry(1));
                    }
                    4 => {
                        let _ = kill_tx.send(true);
                    }
                    _ => {}
                }
            }
        }
    }

    assert_eq!(events.len(), 4);
    match &events[0] {
        SubscriberEvent::SetReplica(replica) => assert_eq!(*replica, json!({"base": true})),
        other => panic!("expected initial SetReplica, got {other:?}"),
    }
    match &events[1] {
        SubscriberEvent::Entry(entry) => assert_eq!(entry.message_id, 0),
        other => panic!("expected Entry(0), got {other:?}"),
    }
    match &events[2] {
        SubscriberEvent::SetReplica(replica) => {
            assert_eq!(*replica, json!({"replica": "after-gc"}))
        }
        other => panic!("expected re-seek SetReplica, got {other:?}"),
    }
    match &events[3] {
        SubscriberEvent::Entry(entry) => assert_eq!(entry.message_id, 2),
        other => panic!("expected Entry(2) resuming at origin.message_id + 1, got {other:?}"),
    }
}

#[tokio::test]
async fn s5_cas_chunk_force_write_overwrites() {
    let (client, paths) = harness("t5");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();

    let chunks = ChunkStore::new(&client, &paths);
    chunks
        .force_write_chunk("c", &json!({"v": 1}))
        .await
        .unwrap();
    chunks
        .force_write_chunk("c", &json!({"v": 2}))
        .await
        .unwrap();

    let value: Value = chunks.read_chunk(ChunkKind::Chunk, "c", None).await.unwrap();
    assert_eq!(value, json!({"v": 2}));
}

#[tokio::test]
async fn s6_origin_regression_is_rejected() {
    let (client, paths) = harness("t6");
    bootstrap(&client, &paths, &json!({"base": true})).await.unwrap();

    let origin = OriginManager::new(&client, &paths);
    origin.update_origin(json!({"r": 1}), 7).await.unwrap();
    origin.update_origin(json!({"r": 0}), 3).await.unwrap();

    let snapshot = origin.read_origin::<Value>().await.unwrap();
    assert_eq!(snapshot.message_id, 7);
    assert_eq!(snapshot.replica, json!({"r": 1}));
}
