//! Postgres-backed [`LogStore`]

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{LogStore, StoreResult};
use crate::models::{FailedParse, ParsedEvent, RawLine};

/// [`LogStore`] backed by the shared connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for PostgresStore {
    async fn save_raw_line(&self, line: &RawLine) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO raw_lines (id, source_id, text, received_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(line.id)
        .bind(line.source_id)
        .bind(&line.text)
        .bind(line.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_parsed_event(&self, event: &ParsedEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO parsed_events
                (id, raw_line_id, source_id, event_kind, event_payload, session_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.raw_line_id)
        .bind(event.source_id)
        .bind(&event.event_kind)
        .bind(&event.event_payload)
        .bind(event.session_id)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_failed_parse(&self, failure: &FailedParse) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_parses (id, raw_line_id, error_message, retry_count, resolved, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(failure.id)
        .bind(failure.raw_line_id)
        .bind(&failure.error_message)
        .bind(failure.retry_count)
        .bind(failure.resolved)
        .bind(failure.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // A plain UPDATE suffices: ingest is rejected before the pipeline for
    // sources that are not registered, so the row always exists.
    async fn touch_source(&self, source_id: Uuid, address: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE sources
            SET last_seen_at = NOW(), last_address = $2
            WHERE id = $1
            "#,
        )
        .bind(source_id)
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
