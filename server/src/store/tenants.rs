use chrono::{DateTime, Utc};
use common::{Tenant, TenantStatus};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    slug: String,
    name: String,
    plan: String,
    status: String,
    settings: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    suspended_at: Option<DateTime<Utc>>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TenantStatus>()
            .map_err(|_| StoreError::Db(sqlx::Error::Decode("bad tenant status".into())))?;
        Ok(Tenant {
            id: row.id,
            slug: row.slug,
            name: row.name,
            plan: row.plan,
            status,
            settings: row.settings,
            created_at: row.created_at,
            updated_at: row.updated_at,
            suspended_at: row.suspended_at,
        })
    }
}

impl Store {
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn create_tenant(&self, slug: &str, name: &str, plan: &str) -> StoreResult<Tenant> {
        if !common::is_valid_slug(slug) {
            return Err(StoreError::Validation("slug must match ^[a-z0-9-]+$".into()));
        }
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            INSERT INTO tenants (id, slug, name, plan, status, settings)
            VALUES ($1, $2, $3, $4, 'active', '{}'::jsonb)
            RETURNING id, slug, name, plan, status, settings, created_at, updated_at, suspended_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(name)
        .bind(plan)
        .fetch_one(self.pool())
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.constraint() == Some("tenants_slug_key") => {
                StoreError::Conflict("slug already exists".into())
            }
            _ => StoreError::Db(err),
        })?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_tenant(&self, id: Uuid) -> StoreResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"SELECT id, slug, name, plan, status, settings, created_at, updated_at, suspended_at
               FROM tenants WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_tenant_by_slug(&self, slug: &str) -> StoreResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"SELECT id, slug, name, plan, status, settings, created_at, updated_at, suspended_at
               FROM tenants WHERE slug = $1"#,
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn suspend_tenant(&self, id: Uuid) -> StoreResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            UPDATE tenants SET status = 'suspended', suspended_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, slug, name, plan, status, settings, created_at, updated_at, suspended_at
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn reactivate_tenant(&self, id: Uuid) -> StoreResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            UPDATE tenants SET status = 'active', suspended_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING id, slug, name, plan, status, settings, created_at, updated_at, suspended_at
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            r#"SELECT id, slug, name, plan, status, settings, created_at, updated_at, suspended_at
               FROM tenants ORDER BY created_at DESC"#,
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Tenant::try_from).collect()
    }
}
