//! Domain records for the ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One raw log line as received from a source, before any parsing.
///
/// Immutable once created; the unit of transport through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLine {
    pub id: Uuid,
    pub source_id: Uuid,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl RawLine {
    pub fn new(source_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// A classified event produced from exactly one raw line (or, for assembled
/// JSON blocks, from the last raw line of the block).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub id: Uuid,
    pub raw_line_id: Uuid,
    pub source_id: Uuid,
    /// Classification label, e.g. `"kill"`, `"chat-gg"`, `"aggregate-block"`.
    /// Open taxonomy; `"unclassified"` is the terminal bucket.
    pub event_kind: String,
    pub event_payload: serde_json::Value,
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ParsedEvent {
    pub fn new(
        raw_line_id: Uuid,
        source_id: Uuid,
        event_kind: impl Into<String>,
        event_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw_line_id,
            source_id,
            event_kind: event_kind.into(),
            event_payload,
            session_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Recorded when neither the grammar nor any heuristic rule matched a line,
/// or when an assembled JSON block failed to parse.
///
/// `retry_count` and `resolved` are persisted but no retry driver consumes
/// them yet; they exist so reprocessing can be added without a migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedParse {
    pub id: Uuid,
    pub raw_line_id: Uuid,
    pub error_message: String,
    pub retry_count: i32,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl FailedParse {
    pub fn new(raw_line_id: Uuid, error_message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw_line_id,
            error_message: error_message.into(),
            retry_count: 0,
            resolved: false,
            created_at: Utc::now(),
        }
    }
}
