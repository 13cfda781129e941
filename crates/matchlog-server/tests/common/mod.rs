//! Shared test doubles for pipeline integration tests
//!
//! The pipeline only talks to its collaborators through traits, so tests
//! swap in an in-memory store and session detector and run the whole thing
//! without a database.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use matchlog_server::models::{FailedParse, ParsedEvent, RawLine};
use matchlog_server::session::{SessionDetector, SESSION_CLOSE_KIND, SESSION_OPEN_KIND};
use matchlog_server::storage::{LogStore, StoreError, StoreResult};

/// In-memory [`LogStore`] recording everything the pipeline writes.
#[derive(Default)]
pub struct MemoryStore {
    pub raw_lines: Mutex<Vec<RawLine>>,
    pub events: Mutex<Vec<ParsedEvent>>,
    pub failures: Mutex<Vec<FailedParse>>,
    pub touched: Mutex<Vec<(Uuid, String)>>,
    /// Raw lines containing this marker fail to persist.
    pub poison_marker: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poisoned(marker: impl Into<String>) -> Self {
        Self {
            poison_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    pub fn event_kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_kind.clone())
            .collect()
    }

    pub fn events_for(&self, source_id: Uuid) -> Vec<ParsedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.source_id == source_id)
            .cloned()
            .collect()
    }

    pub fn raw_count(&self) -> usize {
        self.raw_lines.lock().unwrap().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    /// Poll until the store holds at least `events` parsed events and
    /// `failures` parse failures. Panics after a few seconds; the workers
    /// process asynchronously, so every assertion on their output goes
    /// through here first.
    pub async fn wait_for(&self, events: usize, failures: usize) {
        for _ in 0..500 {
            if self.event_count() >= events && self.failure_count() >= failures {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {} events / {} failures (have {} / {})",
            events,
            failures,
            self.event_count(),
            self.failure_count()
        );
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn save_raw_line(&self, line: &RawLine) -> StoreResult<()> {
        if let Some(marker) = &self.poison_marker {
            if line.text.contains(marker.as_str()) {
                return Err(StoreError::Other("injected raw line failure".to_string()));
            }
        }
        self.raw_lines.lock().unwrap().push(line.clone());
        Ok(())
    }

    async fn save_parsed_event(&self, event: &ParsedEvent) -> StoreResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn save_failed_parse(&self, failure: &FailedParse) -> StoreResult<()> {
        self.failures.lock().unwrap().push(failure.clone());
        Ok(())
    }

    async fn touch_source(&self, source_id: Uuid, address: &str) -> StoreResult<()> {
        self.touched
            .lock()
            .unwrap()
            .push((source_id, address.to_string()));
        Ok(())
    }
}

/// In-memory session detector mirroring the open/close semantics of the
/// Postgres implementation.
#[derive(Default)]
pub struct MemorySessions {
    open: Mutex<HashMap<Uuid, Uuid>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionDetector for MemorySessions {
    async fn detect(&self, event: &ParsedEvent) -> anyhow::Result<Option<Uuid>> {
        let mut open = self.open.lock().unwrap();
        match event.event_kind.as_str() {
            SESSION_OPEN_KIND => {
                let id = Uuid::new_v4();
                open.insert(event.source_id, id);
                Ok(Some(id))
            }
            SESSION_CLOSE_KIND => Ok(open.remove(&event.source_id)),
            _ => Ok(open.get(&event.source_id).copied()),
        }
    }
}

/// Detector that never attaches a session.
pub struct NoSessions;

#[async_trait]
impl SessionDetector for NoSessions {
    async fn detect(&self, _event: &ParsedEvent) -> anyhow::Result<Option<Uuid>> {
        Ok(None)
    }
}
