use chrono::{DateTime, Utc};
use common::AuditLog;
use uuid::Uuid;

use super::{Store, StoreResult};

#[derive(sqlx::FromRow)]
struct AuditLogRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    actor: String,
    action: String,
    resource: Option<String>,
    resource_id: Option<String>,
    details: serde_json::Value,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditLog {
    fn from(row: AuditLogRow) -> Self {
        AuditLog {
            id: row.id,
            tenant_id: row.tenant_id,
            actor: row.actor,
            action: row.action,
            resource: row.resource,
            resource_id: row.resource_id,
            details: row.details,
            ip_address: row.ip_address,
            created_at: row.created_at,
        }
    }
}

impl Store {
    /// Every admin mutation writes here (spec.md §4.8); reached only through
    /// the fire-and-forget background queue, never inline on the request
    /// path.
    #[tracing::instrument(skip(self, details), level = "debug")]
    #[allow(clippy::too_many_arguments)]
    pub async fn write_audit_log(
        &self,
        tenant_id: Option<Uuid>,
        actor: &str,
        action: &str,
        resource: Option<&str>,
        resource_id: Option<&str>,
        details: serde_json::Value,
        ip_address: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, tenant_id, actor, action, resource, resource_id, details, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(actor)
        .bind(action)
        .bind(resource)
        .bind(resource_id)
        .bind(details)
        .bind(ip_address)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_audit_log(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<AuditLog>> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"SELECT id, tenant_id, actor, action, resource, resource_id, details, ip_address, created_at
               FROM audit_log WHERE ($1::uuid IS NULL OR tenant_id = $1)
               ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(AuditLog::from).collect())
    }
}
