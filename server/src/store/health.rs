use chrono::{DateTime, Utc};
use common::{HealthStatus, WorkerHealth};

use super::{Store, StoreResult};

#[derive(sqlx::FromRow)]
struct WorkerHealthRow {
    status: String,
    last_heartbeat: DateTime<Utc>,
    messages_processed: i64,
}

impl Store {
    /// Upserts the singleton `id='main'` row, bumping the heartbeat and
    /// adding to the processed counter (spec.md §4.4 step 4).
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn bump_worker_heartbeat(&self, processed_delta: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO worker_health (id, status, last_heartbeat, messages_processed)
            VALUES ('main', 'online', NOW(), $1)
            ON CONFLICT (id) DO UPDATE SET
                status = 'online',
                last_heartbeat = NOW(),
                messages_processed = worker_health.messages_processed + $1
            "#,
        )
        .bind(processed_delta)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_worker_health(&self) -> StoreResult<Option<WorkerHealth>> {
        let row: Option<WorkerHealthRow> = sqlx::query_as(
            "SELECT status, last_heartbeat, messages_processed FROM worker_health WHERE id = 'main'",
        )
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|row| WorkerHealth {
            status: row
                .status
                .parse::<HealthStatus>()
                .unwrap_or(HealthStatus::Offline),
            last_heartbeat: row.last_heartbeat,
            messages_processed: row.messages_processed,
        }))
    }
}
