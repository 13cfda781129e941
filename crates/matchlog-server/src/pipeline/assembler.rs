//! Multi-line JSON block assembly
//!
//! Sources periodically dump a statistics object as many consecutive log
//! lines, delimited by begin/end markers and interleaved with ordinary
//! traffic from other sources:
//!
//! ```text
//! L 08/19/2025 - 19:03:31: JSON_BEGIN{
//! L 08/19/2025 - 19:03:31: "round_number" : "12",
//! L 08/19/2025 - 19:03:31: "score_ct" : "7",
//! ...
//! L 08/19/2025 - 19:03:31: }}JSON_END
//! ```
//!
//! One assembler exists per source and moves between `Idle` and
//! `Collecting`. Correctness depends on lines from a source arriving in
//! order; the dispatcher guarantees that by owning one assembler per source
//! worker.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;
use uuid::Uuid;

/// A line containing this marker opens a block.
pub const BLOCK_BEGIN_MARKER: &str = "JSON_BEGIN{";

/// A line containing this marker closes a block.
pub const BLOCK_END_MARKER: &str = "}}JSON_END";

/// What the assembler did with an offered line.
#[derive(Debug)]
pub enum Outcome {
    /// Not block-related; route through the ordinary classifier.
    Ordinary,
    /// Consumed into the open block (or discarded as in-block noise).
    Buffered,
    /// An end marker closed the block and the JSON parsed cleanly.
    Completed(AssembledBlock),
    /// An end marker closed the block but the JSON was malformed.
    Malformed(MalformedBlock),
}

/// A successfully reassembled block.
#[derive(Debug, Clone)]
pub struct AssembledBlock {
    pub object: serde_json::Map<String, serde_json::Value>,
    pub first_raw_id: Uuid,
    pub last_raw_id: Uuid,
    pub opened_at: DateTime<Utc>,
}

/// A block whose concatenation failed to parse. Interior field lines are
/// handed back so the caller can degrade to per-line classification.
#[derive(Debug, Clone)]
pub struct MalformedBlock {
    pub field_lines: Vec<String>,
    pub error: String,
    pub last_raw_id: Uuid,
}

enum BufferState {
    Idle,
    Collecting {
        lines: Vec<String>,
        opened_at: DateTime<Utc>,
        first_raw_id: Uuid,
        last_raw_id: Uuid,
    },
}

/// Per-source state machine reassembling begin/end-delimited JSON blocks.
pub struct BlockAssembler {
    state: BufferState,
    field_shape: Regex,
}

impl Default for BlockAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAssembler {
    pub fn new() -> Self {
        #[allow(clippy::expect_used)]
        let field_shape =
            Regex::new(r#"^"[^"]+"\s*:"#).expect("invalid field shape pattern");
        Self {
            state: BufferState::Idle,
            field_shape,
        }
    }

    /// True while a block is open for this source.
    pub fn is_collecting(&self) -> bool {
        matches!(self.state, BufferState::Collecting { .. })
    }

    /// Offer the next line (canonical form) from this source.
    pub fn offer(&mut self, raw_id: Uuid, canonical: &str) -> Outcome {
        if canonical.contains(BLOCK_BEGIN_MARKER) {
            // A begin marker always starts a fresh block, clobbering any
            // half-open one from a source that never sent its end marker.
            if self.is_collecting() {
                tracing::warn!("Begin marker arrived while a block was already open; restarting");
            }
            self.state = BufferState::Collecting {
                lines: vec!["{".to_string()],
                opened_at: Utc::now(),
                first_raw_id: raw_id,
                last_raw_id: raw_id,
            };
            return Outcome::Buffered;
        }

        if canonical.contains(BLOCK_END_MARKER) {
            return match std::mem::replace(&mut self.state, BufferState::Idle) {
                BufferState::Collecting {
                    mut lines,
                    opened_at,
                    first_raw_id,
                    last_raw_id: _,
                } => {
                    lines.push("}".to_string());
                    self.close_block(lines, opened_at, first_raw_id, raw_id)
                },
                // End marker with no open block: an ordinary line
                BufferState::Idle => Outcome::Ordinary,
            };
        }

        match &mut self.state {
            BufferState::Collecting { lines, last_raw_id, .. } => {
                let trimmed = extract_field_line(&self.field_shape, canonical);
                match trimmed {
                    Some(field) => {
                        lines.push(field);
                        *last_raw_id = raw_id;
                    },
                    None => {
                        // In-block noise; dropped, not classified
                        tracing::debug!(line = canonical, "Discarding non-field line inside block");
                    },
                }
                Outcome::Buffered
            },
            BufferState::Idle => Outcome::Ordinary,
        }
    }

    fn close_block(
        &self,
        lines: Vec<String>,
        opened_at: DateTime<Utc>,
        first_raw_id: Uuid,
        last_raw_id: Uuid,
    ) -> Outcome {
        let joined = lines.join("\n");
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&joined) {
            Ok(object) => Outcome::Completed(AssembledBlock {
                object,
                first_raw_id,
                last_raw_id,
                opened_at,
            }),
            Err(e) => {
                let field_lines = lines
                    .into_iter()
                    .filter(|l| l != "{" && l != "}")
                    .collect();
                Outcome::Malformed(MalformedBlock {
                    field_lines,
                    error: format!("failed to parse assembled block: {}", e),
                    last_raw_id,
                })
            },
        }
    }

    /// Discard the open block if it has been collecting longer than
    /// `max_age`. Returns true when a buffer was evicted.
    pub fn evict_if_stale(&mut self, max_age: Duration) -> bool {
        let BufferState::Collecting { opened_at, .. } = &self.state else {
            return false;
        };
        let age = Utc::now().signed_duration_since(*opened_at);
        if age.num_milliseconds() >= max_age.as_millis() as i64 {
            tracing::warn!(age_secs = age.num_seconds(), "Evicting stale block buffer");
            self.state = BufferState::Idle;
            true
        } else {
            false
        }
    }
}

/// Accept quoted-key field lines and the bare braces that close nested
/// objects; everything else inside a block is noise.
fn extract_field_line(field_shape: &Regex, canonical: &str) -> Option<String> {
    let body = strip_line_prefix(canonical).trim();
    if field_shape.is_match(body) || body == "}" || body == "}," || body == "{" {
        Some(body.to_string())
    } else {
        None
    }
}

/// Interior lines still carry the canonical `L <date> - <time>: ` prefix;
/// the JSON content is everything after it.
fn strip_line_prefix(canonical: &str) -> &str {
    if !canonical.starts_with("L ") {
        return canonical;
    }
    match canonical.split_once(" - ") {
        // First ": " after the time field ends the prefix
        Some((_, rest)) => match rest.split_once(": ") {
            Some((_, content)) => content,
            None => canonical,
        },
        None => canonical,
    }
}
