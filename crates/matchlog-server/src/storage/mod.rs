//! Persistence seam for the ingestion pipeline
//!
//! The pipeline only talks to [`LogStore`]; the Postgres implementation
//! lives in [`postgres`], and tests substitute an in-memory store.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FailedParse, ParsedEvent, RawLine};

pub mod postgres;

pub use postgres::PostgresStore;

/// Errors surfaced by a [`LogStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Write-side persistence used by the pipeline.
///
/// Every raw line is stored exactly once per delivery; the pipeline does no
/// deduplication, so redelivered batches produce duplicate rows by design.
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    /// Persist one raw line as received, before any parsing.
    async fn save_raw_line(&self, line: &RawLine) -> StoreResult<()>;

    /// Persist one classified event.
    async fn save_parsed_event(&self, event: &ParsedEvent) -> StoreResult<()>;

    /// Persist one parse failure for later inspection and retry.
    async fn save_failed_parse(&self, failure: &FailedParse) -> StoreResult<()>;

    /// Record that a source was heard from, updating its liveness fields.
    async fn touch_source(&self, source_id: Uuid, address: &str) -> StoreResult<()>;
}
