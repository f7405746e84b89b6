use chrono::{DateTime, Utc};
use common::{RetryPolicy, Webhook, WebhookEventType};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: Uuid,
    tenant_id: Uuid,
    event_type: String,
    url: String,
    signing_secret: String,
    is_active: bool,
    max_retries: i32,
    backoff_ms: i64,
    last_triggered: Option<DateTime<Utc>>,
    last_status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const WEBHOOK_COLUMNS: &str = "id, tenant_id, event_type, url, signing_secret, is_active, \
     max_retries, backoff_ms, last_triggered, last_status, created_at, updated_at";

impl TryFrom<WebhookRow> for Webhook {
    type Error = StoreError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        let event_type = row
            .event_type
            .parse::<WebhookEventType>()
            .map_err(|_| StoreError::Db(sqlx::Error::Decode("bad webhook event type".into())))?;
        Ok(Webhook {
            id: row.id,
            tenant_id: row.tenant_id,
            event_type,
            url: row.url,
            signing_secret: row.signing_secret,
            is_active: row.is_active,
            retry_policy: RetryPolicy {
                max_retries: row.max_retries,
                backoff_ms: row.backoff_ms,
            },
            last_triggered: row.last_triggered,
            last_status: row.last_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Store {
    #[tracing::instrument(skip(self, signing_secret), level = "debug")]
    pub async fn create_webhook(
        &self,
        tenant_id: Uuid,
        event_type: WebhookEventType,
        url: &str,
        signing_secret: &str,
        retry_policy: RetryPolicy,
    ) -> StoreResult<Webhook> {
        let query = format!(
            r#"
            INSERT INTO webhooks
                (id, tenant_id, event_type, url, signing_secret, is_active, max_retries, backoff_ms)
            VALUES ($1, $2, $3, $4, $5, true, $6, $7)
            RETURNING {WEBHOOK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(event_type.to_string())
            .bind(url)
            .bind(signing_secret)
            .bind(retry_policy.max_retries)
            .bind(retry_policy.backoff_ms)
            .fetch_one(self.pool())
            .await?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_active_webhooks_for_event(
        &self,
        tenant_id: Uuid,
        event_type: WebhookEventType,
    ) -> StoreResult<Vec<Webhook>> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks \
             WHERE tenant_id = $1 AND event_type = $2 AND is_active = true"
        );
        let rows = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(tenant_id)
            .bind(event_type.to_string())
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Webhook::try_from).collect()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_webhooks(&self, tenant_id: Uuid) -> StoreResult<Vec<Webhook>> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE tenant_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(tenant_id)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Webhook::try_from).collect()
    }

    /// Fire-and-forget target, per spec.md §4.6.
    #[tracing::instrument(skip(self, status), level = "debug")]
    pub async fn record_webhook_attempt(&self, id: Uuid, status: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE webhooks SET last_triggered = NOW(), last_status = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, signing_secret), level = "debug")]
    pub async fn rotate_webhook_secret(
        &self,
        id: Uuid,
        signing_secret: &str,
    ) -> StoreResult<Webhook> {
        let query = format!(
            r#"
            UPDATE webhooks SET signing_secret = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {WEBHOOK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(id)
            .bind(signing_secret)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn delete_webhook(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn count_webhooks_fired_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM webhooks WHERE last_triggered >= $1",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}
