//! End-to-end pipeline tests over the in-memory store
//!
//! These drive [`IngestPipeline`] the way the HTTP handler does and assert
//! on what reaches the store: raw lines at acceptance time, events and
//! failures once the per-source workers have drained their queues.

mod common;

use std::sync::Arc;

use matchlog_server::config::PipelineConfig;
use matchlog_server::pipeline::IngestPipeline;
use matchlog_server::session::SessionDetector;
use uuid::Uuid;

use common::{MemorySessions, MemoryStore, NoSessions};

const KILL: &str = r#"L 08/19/2025 - 19:03:31: "Alice<3><[U:1:111]><CT>" [100 -200 60] killed "Bob<4><[U:1:222]><TERRORIST>" [-50 75 60] with "ak47" (headshot)"#;

// Takes the store by value so the unsized coercion to `Arc<dyn LogStore>`
// happens here; `Arc::clone` at the call site would pin the concrete type.
fn pipeline_with(store: Arc<MemoryStore>, sessions: Arc<dyn SessionDetector>) -> IngestPipeline {
    IngestPipeline::new(store, sessions, PipelineConfig::default())
}

fn pipeline(store: Arc<MemoryStore>) -> IngestPipeline {
    pipeline_with(store, Arc::new(NoSessions))
}

#[tokio::test]
async fn test_batch_is_persisted_and_classified() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    let body = format!(
        "{}\n{}\n\n{}\n",
        KILL,
        r#"L 08/19/2025 - 19:03:32: "P<1><[U:1:1]><CT>" say "gg""#,
        "L 08/19/2025 - 19:03:33: nothing the patterns know",
    );

    let receipt = pipeline.ingest(source, "10.0.0.7", &body).await;
    assert_eq!(receipt.accepted, 3, "blank lines are skipped, not counted");
    assert_eq!(store.raw_count(), 3);

    store.wait_for(3, 0).await;
    assert_eq!(store.event_kinds(), vec!["kill", "chat-gg", "unclassified"]);

    let touched = store.touched.lock().unwrap();
    assert_eq!(touched.as_slice(), &[(source, "10.0.0.7".to_string())]);
}

#[tokio::test]
async fn test_lines_from_one_source_stay_ordered() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    let body: String = (0..50)
        .map(|i| {
            format!(
                "L 08/19/2025 - 19:03:31: \"P<1><[U:1:1]><CT>\" say \"msg-{}\"\n",
                i
            )
        })
        .collect();

    pipeline.ingest(source, "10.0.0.7", &body).await;
    store.wait_for(50, 0).await;

    let events = store.events_for(source);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(
            event.event_payload["text"],
            format!("msg-{}", i),
            "event {} arrived out of order",
            i
        );
    }
}

#[tokio::test]
async fn test_interleaved_sources_keep_separate_blocks() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source_a = Uuid::new_v4();
    let source_b = Uuid::new_v4();

    // Source A streams a block while source B keeps sending ordinary
    // traffic; each call interleaves with the other source's
    pipeline.ingest(source_a, "10.0.0.1", "JSON_BEGIN{").await;
    pipeline.ingest(source_b, "10.0.0.2", KILL).await;
    pipeline
        .ingest(source_a, "10.0.0.1", r#""score_ct" : "7""#)
        .await;
    pipeline.ingest(source_b, "10.0.0.2", KILL).await;
    pipeline.ingest(source_a, "10.0.0.1", "}}JSON_END").await;

    // Two kill events for B, the aggregate plus its reference for A
    store.wait_for(4, 0).await;

    let a_events = store.events_for(source_a);
    let aggregate = a_events
        .iter()
        .find(|e| e.event_kind == "aggregate-block")
        .expect("aggregate event");
    assert_eq!(aggregate.event_payload["score_ct"], "7");

    // B's kills were not swallowed into A's block
    let b_kinds: Vec<_> = store
        .events_for(source_b)
        .iter()
        .map(|e| e.event_kind.clone())
        .collect();
    assert_eq!(b_kinds, vec!["kill", "kill"]);
}

#[tokio::test]
async fn test_multi_line_block_emits_reference_event() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    let body = "JSON_BEGIN{\n\"score_ct\" : \"7\"\n}}JSON_END";
    pipeline.ingest(source, "10.0.0.7", body).await;

    store.wait_for(2, 0).await;
    let events = store.events_for(source);

    let aggregate = events
        .iter()
        .find(|e| e.event_kind == "aggregate-block")
        .expect("aggregate event");
    let reference = events
        .iter()
        .find(|e| e.event_kind == "aggregate-block-ref")
        .expect("reference event");

    assert_eq!(
        reference.event_payload["aggregate_event_id"],
        aggregate.id.to_string()
    );
    assert_ne!(reference.raw_line_id, aggregate.raw_line_id);
}

#[tokio::test]
async fn test_malformed_block_degrades_per_line() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    // Both lines are field-shaped, but the second breaks the JSON
    let body = "JSON_BEGIN{\n\"score_ct\" : \"7\",\n\"broken\" : oops\n}}JSON_END";
    pipeline.ingest(source, "10.0.0.7", body).await;

    // One failure for the block, one for the unsalvageable field line;
    // the good field line still becomes an event
    store.wait_for(1, 2).await;

    let kinds = store.event_kinds();
    assert_eq!(kinds, vec!["stats-json-score-ct"]);
    assert_eq!(store.failure_count(), 2);

    let failures = store.failures.lock().unwrap();
    assert!(failures[0].error_message.contains("failed to parse"));
}

#[tokio::test]
async fn test_unparseable_line_records_failure() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    pipeline
        .ingest(source, "10.0.0.7", "complete garbage")
        .await;

    store.wait_for(0, 1).await;
    assert_eq!(store.event_count(), 0);

    let failures = store.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].resolved);
}

#[tokio::test]
async fn test_raw_write_failure_drops_only_that_line() {
    let store = Arc::new(MemoryStore::poisoned("poisoned"));
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    let body = format!("{}\npoisoned line\n{}", KILL, KILL);
    let receipt = pipeline.ingest(source, "10.0.0.7", &body).await;

    assert_eq!(receipt.accepted, 2);
    assert_eq!(store.raw_count(), 2);

    store.wait_for(2, 0).await;
    assert_eq!(store.event_kinds(), vec!["kill", "kill"]);
}

#[tokio::test]
async fn test_redelivered_batch_is_stored_again() {
    // No deduplication anywhere: acceptance means append
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    pipeline.ingest(source, "10.0.0.7", KILL).await;
    pipeline.ingest(source, "10.0.0.7", KILL).await;

    store.wait_for(2, 0).await;
    assert_eq!(store.raw_count(), 2);
    assert_eq!(store.event_kinds(), vec!["kill", "kill"]);
}

#[tokio::test]
async fn test_session_spans_match_start_to_end() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_with(Arc::clone(&store), Arc::new(MemorySessions::new()));
    let source = Uuid::new_v4();

    let body = [
        r#"L 08/19/2025 - 19:00:00: World triggered "Match_Start" on "de_mirage""#,
        KILL,
        "L 08/19/2025 - 21:30:00: Game Over: competitive mg_active de_mirage score 16:14 after 47 min",
        KILL,
    ]
    .join("\n");

    pipeline.ingest(source, "10.0.0.7", &body).await;
    store.wait_for(4, 0).await;

    let events = store.events_for(source);
    let session = events[0].session_id.expect("match start opens a session");
    assert_eq!(events[1].session_id, Some(session), "kill joins the open session");
    assert_eq!(events[2].session_id, Some(session), "match end closes it");
    assert_eq!(events[3].session_id, None, "nothing open after the end");
}

#[tokio::test]
async fn test_shutdown_drains_queued_lines() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store));
    let source = Uuid::new_v4();

    let body: String = (0..25)
        .map(|i| {
            format!(
                "L 08/19/2025 - 19:03:31: \"P<1><[U:1:1]><CT>\" say \"msg-{}\"\n",
                i
            )
        })
        .collect();

    pipeline.ingest(source, "10.0.0.7", &body).await;
    pipeline.shutdown().await;

    // No polling: by the time shutdown returns, the worker has drained
    assert_eq!(store.event_count(), 25);
}
