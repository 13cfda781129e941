//! Ingestion coordination
//!
//! The pipeline fans incoming lines out to one worker task per source. Each
//! worker owns that source's [`BlockAssembler`] and drains a bounded queue,
//! so lines from one source are always processed in arrival order while
//! different sources proceed concurrently. A slow or misbehaving source
//! backs up only its own queue.
//!
//! Acceptance is decoupled from classification: the caller gets its receipt
//! as soon as raw lines are persisted and queued; parsing, classification
//! and event storage happen on the worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::{FailedParse, ParsedEvent, RawLine};
use crate::pipeline::assembler::{AssembledBlock, BlockAssembler, MalformedBlock, Outcome};
use crate::pipeline::classify::Classifier;
use crate::pipeline::envelope;
use crate::session::SessionDetector;
use crate::storage::LogStore;

/// Event kind of a reassembled statistics block.
pub const AGGREGATE_BLOCK_KIND: &str = "aggregate-block";

/// Companion event pointing the block's first raw line at its payload.
pub const AGGREGATE_BLOCK_REF_KIND: &str = "aggregate-block-ref";

/// What an ingest call accepted.
#[derive(Debug, Clone, Copy)]
pub struct IngestReceipt {
    /// Non-empty lines persisted and queued for classification.
    pub accepted: usize,
}

struct WorkerHandle {
    tx: mpsc::Sender<RawLine>,
    join: tokio::task::JoinHandle<()>,
}

struct WorkerContext {
    source_id: Uuid,
    store: Arc<dyn LogStore>,
    sessions: Arc<dyn SessionDetector>,
    classifier: Arc<Classifier>,
    config: PipelineConfig,
}

/// Fan-out coordinator owning the per-source worker map.
///
/// Workers live for the lifetime of the pipeline; tearing one down while a
/// replacement spins up would open a window where two tasks process the same
/// source, breaking per-source ordering. An idle worker costs only its empty
/// channel and assembler, and the map is bounded by the number of registered
/// sources.
pub struct IngestPipeline {
    store: Arc<dyn LogStore>,
    sessions: Arc<dyn SessionDetector>,
    classifier: Arc<Classifier>,
    config: PipelineConfig,
    workers: Mutex<HashMap<Uuid, WorkerHandle>>,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn LogStore>,
        sessions: Arc<dyn SessionDetector>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            classifier: Arc::new(Classifier::new()),
            config,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Accept a batch of raw lines from one source.
    ///
    /// Each non-empty line is persisted immediately and queued to the
    /// source's worker. A line whose raw insert fails is dropped from the
    /// batch without affecting the others.
    pub async fn ingest(&self, source_id: Uuid, address: &str, body: &str) -> IngestReceipt {
        let mut accepted = 0;

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let raw = RawLine::new(source_id, line);
            if let Err(e) = self.store.save_raw_line(&raw).await {
                error!(%source_id, error = %e, "Failed to persist raw line; skipping");
                continue;
            }
            accepted += 1;
            self.enqueue(raw).await;
        }

        if let Err(e) = self.store.touch_source(source_id, address).await {
            warn!(%source_id, error = %e, "Failed to update source liveness");
        }

        IngestReceipt { accepted }
    }

    /// Queue one line to its source's worker, spawning the worker on the
    /// source's first line. Retries if the worker died between lookup and
    /// send (its task panicked and closed the channel).
    async fn enqueue(&self, mut raw: RawLine) {
        loop {
            let tx = self.sender_for(raw.source_id);
            match tx.send(raw).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    warn!(source_id = %returned.source_id, "Source worker gone; respawning");
                    self.forget_worker(returned.source_id, &tx);
                    raw = returned;
                }
            }
        }
    }

    fn sender_for(&self, source_id: Uuid) -> mpsc::Sender<RawLine> {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers
            .entry(source_id)
            .or_insert_with(|| self.spawn_worker(source_id))
            .tx
            .clone()
    }

    /// Drop a dead worker's entry so the next enqueue spawns a fresh one.
    /// Compares channels so a replacement spawned by a racing caller is
    /// left alone.
    fn forget_worker(&self, source_id: Uuid, dead: &mpsc::Sender<RawLine>) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if workers
            .get(&source_id)
            .is_some_and(|h| h.tx.same_channel(dead))
        {
            workers.remove(&source_id);
        }
    }

    fn spawn_worker(&self, source_id: Uuid) -> WorkerHandle {
        debug!(%source_id, "Spawning worker for new source");
        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let ctx = WorkerContext {
            source_id,
            store: Arc::clone(&self.store),
            sessions: Arc::clone(&self.sessions),
            classifier: Arc::clone(&self.classifier),
            config: self.config.clone(),
        };
        let join = tokio::spawn(source_worker(ctx, rx));
        WorkerHandle { tx, join }
    }

    /// Close every worker channel, then wait for the workers to drain their
    /// queues and exit. All senders are dropped before the first join so the
    /// workers wind down in parallel.
    pub async fn shutdown(&self) {
        let handles: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain().map(|(_, h)| h).collect()
        };

        let joins: Vec<tokio::task::JoinHandle<()>> = handles
            .into_iter()
            .map(|WorkerHandle { tx, join }| {
                drop(tx);
                join
            })
            .collect();

        for join in joins {
            if let Err(e) = join.await {
                error!(error = %e, "Source worker failed during shutdown");
            }
        }
    }
}

/// Per-source loop: drain the queue in order, sweep the block buffer for
/// staleness between lines.
async fn source_worker(ctx: WorkerContext, mut rx: mpsc::Receiver<RawLine>) {
    let mut assembler = BlockAssembler::new();
    let stale_after = Duration::from_secs(ctx.config.block_stale_secs);

    let mut sweep = tokio::time::interval(Duration::from_secs(ctx.config.sweep_interval_secs));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    sweep.reset(); // skip the immediate first tick

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(raw) => process_line(&ctx, &mut assembler, raw).await,
                None => break,
            },
            _ = sweep.tick() => {
                if assembler.evict_if_stale(stale_after) {
                    debug!(source_id = %ctx.source_id, "Dropped stale block buffer");
                }
            },
        }
    }

    debug!(source_id = %ctx.source_id, "Source worker exiting");
}

async fn process_line(ctx: &WorkerContext, assembler: &mut BlockAssembler, raw: RawLine) {
    let canonical = envelope::canonicalize(&raw.text);

    match assembler.offer(raw.id, &canonical) {
        Outcome::Buffered => {}
        Outcome::Ordinary => classify_and_store(ctx, raw.id, &canonical).await,
        Outcome::Completed(block) => store_aggregate(ctx, block).await,
        Outcome::Malformed(block) => degrade_block(ctx, block).await,
    }
}

/// Classify one canonical line and persist the result, either a
/// [`ParsedEvent`] or a [`FailedParse`]. Storage failures are logged and
/// swallowed so one bad line never stalls the source's queue.
async fn classify_and_store(ctx: &WorkerContext, raw_line_id: Uuid, canonical: &str) {
    match ctx.classifier.classify(canonical) {
        Ok(classification) => {
            let mut event = ParsedEvent::new(
                raw_line_id,
                ctx.source_id,
                classification.kind,
                classification.payload,
            );

            match ctx.sessions.detect(&event).await {
                Ok(session_id) => event.session_id = session_id,
                Err(e) => {
                    debug!(source_id = %ctx.source_id, error = %e, "Session detection failed")
                }
            }

            if let Err(e) = ctx.store.save_parsed_event(&event).await {
                error!(
                    source_id = %ctx.source_id,
                    kind = %event.event_kind,
                    error = %e,
                    "Failed to store parsed event"
                );
            }
        }
        Err(failure) => {
            let record = FailedParse::new(raw_line_id, failure.to_string());
            if let Err(e) = ctx.store.save_failed_parse(&record).await {
                error!(source_id = %ctx.source_id, error = %e, "Failed to store parse failure");
            }
        }
    }
}

/// Persist a reassembled block as a single aggregate event attributed to the
/// block's last raw line, plus a reference event pointing the first line at
/// it when the block spanned more than one line.
async fn store_aggregate(ctx: &WorkerContext, block: AssembledBlock) {
    let mut event = ParsedEvent::new(
        block.last_raw_id,
        ctx.source_id,
        AGGREGATE_BLOCK_KIND,
        serde_json::Value::Object(block.object),
    );
    // The block's timestamp is when it opened, not when it closed
    event.created_at = block.opened_at;

    match ctx.sessions.detect(&event).await {
        Ok(session_id) => event.session_id = session_id,
        Err(e) => debug!(source_id = %ctx.source_id, error = %e, "Session detection failed"),
    }

    if let Err(e) = ctx.store.save_parsed_event(&event).await {
        error!(source_id = %ctx.source_id, error = %e, "Failed to store aggregate block");
        return;
    }

    if block.first_raw_id != block.last_raw_id {
        let mut reference = ParsedEvent::new(
            block.first_raw_id,
            ctx.source_id,
            AGGREGATE_BLOCK_REF_KIND,
            json!({ "aggregate_event_id": event.id }),
        );
        reference.session_id = event.session_id;
        if let Err(e) = ctx.store.save_parsed_event(&reference).await {
            error!(source_id = %ctx.source_id, error = %e, "Failed to store block reference");
        }
    }
}

/// A block that closed but failed to parse degrades gracefully: record the
/// failure against the closing line, then push each buffered field line back
/// through ordinary classification so the data is not lost entirely.
async fn degrade_block(ctx: &WorkerContext, block: MalformedBlock) {
    warn!(
        source_id = %ctx.source_id,
        lines = block.field_lines.len(),
        "Malformed block; reclassifying interior lines individually"
    );

    let record = FailedParse::new(block.last_raw_id, block.error.clone());
    if let Err(e) = ctx.store.save_failed_parse(&record).await {
        error!(source_id = %ctx.source_id, error = %e, "Failed to store parse failure");
    }

    for line in &block.field_lines {
        classify_and_store(ctx, block.last_raw_id, line).await;
    }
}
