//! Game session detection
//!
//! Match-start events open a session for their source, match-end events
//! close the open one, and everything in between is attached to whichever
//! session is currently open. Detection is best-effort: a failure here never
//! blocks the event from being stored, it just leaves `session_id` empty.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ParsedEvent;

/// Event kind that opens a new session.
pub const SESSION_OPEN_KIND: &str = "match-start";

/// Event kind that closes the open session.
pub const SESSION_CLOSE_KIND: &str = "match-end";

/// One detected match, bounded by match-start and match-end events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GameSession {
    pub id: Uuid,
    pub source_id: Uuid,
    pub map_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Attaches events to game sessions.
#[async_trait]
pub trait SessionDetector: Send + Sync + 'static {
    /// Returns the session id the event belongs to, if any. May open or
    /// close sessions as a side effect.
    async fn detect(&self, event: &ParsedEvent) -> anyhow::Result<Option<Uuid>>;
}

/// Postgres-backed detector keeping session state in `game_sessions`.
#[derive(Clone)]
pub struct PostgresSessionDetector {
    pool: PgPool,
}

impl PostgresSessionDetector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn open_session_id(&self, source_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM game_sessions
            WHERE source_id = $1 AND ended_at IS NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl SessionDetector for PostgresSessionDetector {
    async fn detect(&self, event: &ParsedEvent) -> anyhow::Result<Option<Uuid>> {
        match event.event_kind.as_str() {
            SESSION_OPEN_KIND => {
                // A new match implicitly ends any session the source left
                // dangling (crashed mid-match, lost its end event, ...).
                sqlx::query(
                    r#"
                    UPDATE game_sessions
                    SET ended_at = NOW()
                    WHERE source_id = $1 AND ended_at IS NULL
                    "#,
                )
                .bind(event.source_id)
                .execute(&self.pool)
                .await?;

                let map_name = event
                    .event_payload
                    .get("map")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                let id = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    INSERT INTO game_sessions (id, source_id, map_name, started_at)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(event.source_id)
                .bind(map_name)
                .bind(event.created_at)
                .fetch_one(&self.pool)
                .await?;

                Ok(Some(id))
            }
            SESSION_CLOSE_KIND => {
                let open = self.open_session_id(event.source_id).await?;
                if let Some(id) = open {
                    sqlx::query("UPDATE game_sessions SET ended_at = $2 WHERE id = $1")
                        .bind(id)
                        .bind(event.created_at)
                        .execute(&self.pool)
                        .await?;
                }
                Ok(open)
            }
            _ => self.open_session_id(event.source_id).await,
        }
    }
}
