//! Source admission control
//!
//! Every ingest request names the source it claims to be; the policy decides
//! whether lines from that source are accepted at all. The default policy
//! requires a registered, active row in `sources`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Decides whether a source may submit log lines.
#[async_trait]
pub trait AccessPolicy: Send + Sync + 'static {
    /// True when the source is known and currently allowed to ingest.
    async fn is_authorized(&self, source_id: Uuid) -> anyhow::Result<bool>;
}

/// Policy backed by the `sources` registry table.
#[derive(Clone)]
pub struct RegisteredSourcePolicy {
    pool: PgPool,
}

impl RegisteredSourcePolicy {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessPolicy for RegisteredSourcePolicy {
    async fn is_authorized(&self, source_id: Uuid) -> anyhow::Result<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT is_active FROM sources WHERE id = $1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        // Unknown sources are rejected, not auto-registered
        Ok(active.unwrap_or(false))
    }
}
