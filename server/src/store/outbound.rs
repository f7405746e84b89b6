use chrono::{DateTime, Utc};
use common::{EventDirection, OutboundMessage, OutboundStatus};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct OutboundRow {
    id: Uuid,
    tenant_id: Uuid,
    to_number: String,
    message_body: String,
    status: String,
    from_device_id: Option<Uuid>,
    preferred_device_id: Option<Uuid>,
    external_id: Option<String>,
    idempotency_key: Option<String>,
    attempts: i32,
    max_attempts: i32,
    next_retry_at: DateTime<Utc>,
    last_error: Option<String>,
    error_code: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
}

const OUTBOUND_COLUMNS: &str = "id, tenant_id, to_number, message_body, status, from_device_id, \
     preferred_device_id, external_id, idempotency_key, attempts, max_attempts, next_retry_at, \
     last_error, error_code, metadata, created_at, updated_at, delivered_at, failed_at";

impl TryFrom<OutboundRow> for OutboundMessage {
    type Error = StoreError;

    fn try_from(row: OutboundRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OutboundStatus>()
            .map_err(|_| StoreError::Db(sqlx::Error::Decode("bad outbound status".into())))?;
        Ok(OutboundMessage {
            id: row.id,
            tenant_id: row.tenant_id,
            to_number: row.to_number,
            message_body: row.message_body,
            status,
            from_device_id: row.from_device_id,
            preferred_device_id: row.preferred_device_id,
            external_id: row.external_id,
            idempotency_key: row.idempotency_key,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            next_retry_at: row.next_retry_at,
            last_error: row.last_error,
            error_code: row.error_code,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
            failed_at: row.failed_at,
        })
    }
}

/// Result of `CreateOutbound`: distinguishes a fresh insert from an
/// idempotent replay so the handler can pick the right status code.
pub struct CreateOutboundResult {
    pub message: OutboundMessage,
    pub idempotent: bool,
}

/// Result of `MarkDelivered`: distinguishes a real `sent → delivered`
/// transition from a no-op replay so the caller only fires the webhook once.
pub struct MarkDeliveredResult {
    pub message: OutboundMessage,
    pub delivered: bool,
}

impl Store {
    #[tracing::instrument(skip(self, message_body, metadata), level = "debug")]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_outbound(
        &self,
        tenant_id: Uuid,
        to_number: &str,
        message_body: &str,
        preferred_device_id: Option<Uuid>,
        idempotency_key: Option<&str>,
        max_attempts: i32,
        metadata: serde_json::Value,
    ) -> StoreResult<CreateOutboundResult> {
        let mut tx = self.pool().begin().await?;

        if let Some(key) = idempotency_key {
            let query = format!(
                "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
                 WHERE tenant_id = $1 AND idempotency_key = $2"
            );
            if let Some(row) = sqlx::query_as::<_, OutboundRow>(&query)
                .bind(tenant_id)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?
            {
                if row.to_number != to_number || row.message_body != message_body {
                    return Err(StoreError::Conflict(
                        "idempotency key already in use with different body".into(),
                    ));
                }
                tx.commit().await?;
                return Ok(CreateOutboundResult {
                    message: row.try_into()?,
                    idempotent: true,
                });
            }
        }

        let query = format!(
            r#"
            INSERT INTO outbound_messages
                (id, tenant_id, to_number, message_body, status, preferred_device_id,
                 idempotency_key, attempts, max_attempts, next_retry_at, metadata)
            VALUES ($1, $2, $3, $4, 'queued', $5, $6, 0, $7, NOW(), $8)
            RETURNING {OUTBOUND_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(to_number)
            .bind(message_body)
            .bind(preferred_device_id)
            .bind(idempotency_key)
            .bind(max_attempts)
            .bind(metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db_err)
                    if db_err.constraint() == Some("outbound_messages_tenant_idem_key") =>
                {
                    StoreError::Conflict("idempotency key already in use with different body".into())
                }
                _ => StoreError::Db(err),
            })?;
        let message: OutboundMessage = row.try_into()?;
        insert_status_event(&mut tx, message.id, EventDirection::Outbound, "queued", None).await?;
        tx.commit().await?;
        Ok(CreateOutboundResult {
            message,
            idempotent: false,
        })
    }

    /// `LeaseQueuedMessages`, the heart of the dispatcher. `FOR UPDATE SKIP
    /// LOCKED` on the inner select means concurrent dispatchers (or pull
    /// requests racing the push dispatcher) never lease the same row twice.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn lease_queued_messages(&self, limit: i64) -> StoreResult<Vec<OutboundMessage>> {
        let query = format!(
            r#"
            WITH picked AS (
                SELECT id FROM outbound_messages
                WHERE status = 'queued' AND next_retry_at <= NOW() AND attempts < max_attempts
                ORDER BY next_retry_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            UPDATE outbound_messages
            SET status = 'processing', updated_at = NOW()
            FROM picked
            WHERE outbound_messages.id = picked.id
            RETURNING {cols}
            "#,
            cols = OUTBOUND_COLUMNS
                .split(", ")
                .map(|c| format!("outbound_messages.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(OutboundMessage::try_from).collect()
    }

    /// Lease handed out directly via the device pull-outbound endpoint
    /// (§4.4 pull mode): the pull IS the lease, assigning `from_device_id`
    /// in the same statement.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn pull_lease_for_device(
        &self,
        device: &common::Device,
        limit: i64,
    ) -> StoreResult<Vec<OutboundMessage>> {
        let query = format!(
            r#"
            WITH picked AS (
                SELECT id FROM outbound_messages
                WHERE status = 'queued' AND next_retry_at <= NOW() AND attempts < max_attempts
                  AND (
                        from_device_id = $1
                        OR (tenant_id = $2 AND from_device_id IS NULL)
                        OR ($3 AND tenant_id IS NULL AND from_device_id IS NULL)
                      )
                ORDER BY next_retry_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $4
            )
            UPDATE outbound_messages
            SET status = 'processing', from_device_id = $1, updated_at = NOW()
            FROM picked
            WHERE outbound_messages.id = picked.id
            RETURNING {cols}
            "#,
            cols = OUTBOUND_COLUMNS
                .split(", ")
                .map(|c| format!("outbound_messages.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(device.id)
            .bind(device.tenant_id)
            .bind(device.is_shared_pool)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(OutboundMessage::try_from).collect()
    }

    /// Only `processing → sent` is a legal transition (§4.4); a duplicate
    /// ack on a message already past that point (delivered, failed, or a
    /// second "sent" for the same lease) is a no-op returning the row as-is.
    #[tracing::instrument(skip(self, external_id), level = "debug")]
    pub async fn mark_sent(
        &self,
        id: Uuid,
        external_id: Option<&str>,
        device_id: Uuid,
    ) -> StoreResult<OutboundMessage> {
        let mut tx = self.pool().begin().await?;
        let query = format!(
            r#"
            UPDATE outbound_messages
            SET status = 'sent', attempts = attempts + 1, external_id = $2,
                from_device_id = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {OUTBOUND_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(id)
            .bind(external_id)
            .bind(device_id)
            .fetch_optional(&mut *tx)
            .await?;

        let row = match updated {
            Some(row) => {
                insert_status_event(&mut tx, id, EventDirection::Outbound, "sent", None).await?;
                row
            }
            None => {
                let current_query = format!("SELECT {OUTBOUND_COLUMNS} FROM outbound_messages WHERE id = $1");
                sqlx::query_as::<_, OutboundRow>(&current_query)
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(StoreError::NotFound)?
            }
        };
        tx.commit().await?;
        row.try_into()
    }

    /// `MarkDelivered` only transitions from `sent`; from any other state it
    /// is a no-op logged to the timeline as `delivery_late` (L3: idempotent
    /// under repeated calls). `delivered` on the result tells the caller
    /// whether a real transition happened, so a late/duplicate/out-of-order
    /// report doesn't fire the `sms.delivered` webhook a second time.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn mark_delivered(&self, id: Uuid) -> StoreResult<MarkDeliveredResult> {
        let mut tx = self.pool().begin().await?;
        let query = format!(
            r#"
            UPDATE outbound_messages
            SET status = 'delivered', delivered_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'sent'
            RETURNING {OUTBOUND_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let result = match updated {
            Some(row) => {
                insert_status_event(&mut tx, id, EventDirection::Outbound, "delivered", None)
                    .await?;
                MarkDeliveredResult {
                    message: row.try_into()?,
                    delivered: true,
                }
            }
            None => {
                let current_query = format!("SELECT {OUTBOUND_COLUMNS} FROM outbound_messages WHERE id = $1");
                let row = sqlx::query_as::<_, OutboundRow>(&current_query)
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                insert_status_event(&mut tx, id, EventDirection::Outbound, "delivery_late", None)
                    .await?;
                MarkDeliveredResult {
                    message: row.try_into()?,
                    delivered: false,
                }
            }
        };
        tx.commit().await?;
        Ok(result)
    }

    /// `MarkFailed`. `permanent=true` terminates the message; otherwise it
    /// is requeued with the exponential backoff from spec.md's glossary:
    /// `2^min(attempts,5) * 30s`.
    #[tracing::instrument(skip(self, error), level = "debug")]
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        error_code: Option<&str>,
        permanent: bool,
    ) -> StoreResult<OutboundMessage> {
        let mut tx = self.pool().begin().await?;
        let current_query = format!("SELECT {OUTBOUND_COLUMNS} FROM outbound_messages WHERE id = $1 FOR UPDATE");
        let current = sqlx::query_as::<_, OutboundRow>(&current_query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        if matches!(current.status.as_str(), "delivered" | "failed") {
            tx.commit().await?;
            return current.try_into();
        }

        let promote_to_permanent = permanent || current.attempts + 1 >= current.max_attempts;

        let row = if promote_to_permanent {
            let query = format!(
                r#"
                UPDATE outbound_messages
                SET status = 'failed', attempts = attempts + 1, last_error = $2,
                    error_code = $3, failed_at = NOW(), updated_at = NOW()
                WHERE id = $1
                RETURNING {OUTBOUND_COLUMNS}
                "#
            );
            let row = sqlx::query_as::<_, OutboundRow>(&query)
                .bind(id)
                .bind(error)
                .bind(error_code)
                .fetch_one(&mut *tx)
                .await?;
            insert_status_event(&mut tx, id, EventDirection::Outbound, "failed", None).await?;
            row
        } else {
            let backoff_exponent = (current.attempts + 1).min(5);
            let backoff_secs = 2i64.pow(backoff_exponent as u32) * 30;
            let query = format!(
                r#"
                UPDATE outbound_messages
                SET status = 'queued', attempts = attempts + 1, last_error = $2,
                    error_code = $3, next_retry_at = NOW() + make_interval(secs => $4),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {OUTBOUND_COLUMNS}
                "#
            );
            let row = sqlx::query_as::<_, OutboundRow>(&query)
                .bind(id)
                .bind(error)
                .bind(error_code)
                .bind(backoff_secs)
                .fetch_one(&mut *tx)
                .await?;
            insert_status_event(&mut tx, id, EventDirection::Outbound, "retry_scheduled", None)
                .await?;
            row
        };
        tx.commit().await?;
        row.try_into()
    }

    /// Stale-processing reaper: pull-mode leases not ACKed in time are
    /// requeued, `processing → queued`, without incrementing `attempts`
    /// (the lease itself does not count as an attempt).
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn reap_stale_processing(&self, threshold_ms: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbound_messages
            SET status = 'queued', updated_at = NOW()
            WHERE status = 'processing'
              AND updated_at < NOW() - make_interval(secs => $1::double precision / 1000.0)
            "#,
        )
        .bind(threshold_ms)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_outbound(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<OutboundMessage> {
        let query = format!(
            "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages WHERE id = $1 AND tenant_id = $2"
        );
        let row = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_outbound(
        &self,
        tenant_id: Uuid,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<OutboundMessage>, i64)> {
        let query = format!(
            "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
             WHERE tenant_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, OutboundRow>(&query)
            .bind(tenant_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM outbound_messages WHERE tenant_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(tenant_id)
        .bind(status)
        .fetch_one(self.pool())
        .await?;
        let messages = rows
            .into_iter()
            .map(OutboundMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((messages, total))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn count_outbound_by_status(&self, status: &str) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM outbound_messages WHERE status = $1")
                .bind(status)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_timeline(&self, message_id: Uuid) -> StoreResult<Vec<common::StatusEvent>> {
        let rows: Vec<StatusEventRow> = sqlx::query_as(
            r#"SELECT id, message_id, direction, status, details, created_at
               FROM status_events WHERE message_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(message_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(common::StatusEvent::try_from).collect()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn count_failures_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM outbound_messages WHERE status = 'failed' AND failed_at >= $1",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct StatusEventRow {
    id: Uuid,
    message_id: Uuid,
    direction: String,
    status: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<StatusEventRow> for common::StatusEvent {
    type Error = StoreError;

    fn try_from(row: StatusEventRow) -> Result<Self, Self::Error> {
        let direction = row
            .direction
            .parse::<EventDirection>()
            .map_err(|_| StoreError::Db(sqlx::Error::Decode("bad event direction".into())))?;
        Ok(common::StatusEvent {
            id: row.id,
            message_id: row.message_id,
            direction,
            status: row.status,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

pub(super) async fn insert_status_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    message_id: Uuid,
    direction: EventDirection,
    status: &str,
    details: Option<serde_json::Value>,
) -> StoreResult<()> {
    sqlx::query(
        r#"INSERT INTO status_events (id, message_id, direction, status, details)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(Uuid::new_v4())
    .bind(message_id)
    .bind(direction.to_string())
    .bind(status)
    .bind(details.unwrap_or(serde_json::json!({})))
    .execute(&mut **tx)
    .await?;
    Ok(())
}
