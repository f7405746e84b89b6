use chrono::{DateTime, Utc};
use common::InboundMessage;
use uuid::Uuid;

use super::outbound::insert_status_event;
use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct InboundRow {
    id: Uuid,
    tenant_id: Uuid,
    device_id: Option<Uuid>,
    from_number: String,
    to_number: Option<String>,
    message_body: String,
    external_id: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

const INBOUND_COLUMNS: &str = "id, tenant_id, device_id, from_number, to_number, message_body, \
     external_id, metadata, created_at";

impl From<InboundRow> for InboundMessage {
    fn from(row: InboundRow) -> Self {
        InboundMessage {
            id: row.id,
            tenant_id: row.tenant_id,
            device_id: row.device_id,
            from_number: row.from_number,
            to_number: row.to_number,
            message_body: row.message_body,
            external_id: row.external_id,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

pub struct CreateInboundResult {
    pub message: InboundMessage,
    pub fresh: bool,
}

impl Store {
    /// `CreateInbound`, on `(tenant_id, external_id)` conflict returns the
    /// existing row without inserting or firing events (L2).
    #[tracing::instrument(skip(self, message_body, metadata), level = "debug")]
    pub async fn create_inbound(
        &self,
        tenant_id: Uuid,
        device_id: Option<Uuid>,
        from_number: &str,
        to_number: Option<&str>,
        message_body: &str,
        external_id: Option<&str>,
        metadata: serde_json::Value,
    ) -> StoreResult<CreateInboundResult> {
        let mut tx = self.pool().begin().await?;

        if let Some(ext_id) = external_id {
            let query = format!(
                "SELECT {INBOUND_COLUMNS} FROM inbound_messages WHERE tenant_id = $1 AND external_id = $2"
            );
            if let Some(row) = sqlx::query_as::<_, InboundRow>(&query)
                .bind(tenant_id)
                .bind(ext_id)
                .fetch_optional(&mut *tx)
                .await?
            {
                tx.commit().await?;
                return Ok(CreateInboundResult {
                    message: row.into(),
                    fresh: false,
                });
            }
        }

        let query = format!(
            r#"
            INSERT INTO inbound_messages
                (id, tenant_id, device_id, from_number, to_number, message_body, external_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {INBOUND_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InboundRow>(&query)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(device_id)
            .bind(from_number)
            .bind(to_number)
            .bind(message_body)
            .bind(external_id)
            .bind(metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db_err)
                    if db_err.constraint() == Some("inbound_messages_tenant_external_key") =>
                {
                    StoreError::Conflict("external_id already ingested".into())
                }
                _ => StoreError::Db(err),
            })?;
        let message: InboundMessage = row.into();
        insert_status_event(
            &mut tx,
            message.id,
            common::EventDirection::Inbound,
            "received",
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(CreateInboundResult {
            message,
            fresh: true,
        })
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_inbound(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<InboundMessage> {
        let query =
            format!("SELECT {INBOUND_COLUMNS} FROM inbound_messages WHERE id = $1 AND tenant_id = $2");
        let row = sqlx::query_as::<_, InboundRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_inbound(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<InboundMessage>, i64)> {
        let query = format!(
            "SELECT {INBOUND_COLUMNS} FROM inbound_messages WHERE tenant_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, InboundRow>(&query)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM inbound_messages WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(self.pool())
                .await?;
        Ok((rows.into_iter().map(InboundMessage::from).collect(), total))
    }
}
