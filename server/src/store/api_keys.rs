use chrono::{DateTime, Utc};
use common::{ApiKey, ApiScope};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    key_hash: String,
    key_last4: String,
    scopes: Vec<String>,
    rate_limit_rpm: i32,
    is_active: bool,
    last_used_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = StoreError;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        let scopes = row
            .scopes
            .iter()
            .map(|s| s.parse::<ApiScope>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| StoreError::Db(sqlx::Error::Decode("bad api key scope".into())))?;
        Ok(ApiKey {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            key_hash: row.key_hash,
            key_last4: row.key_last4,
            scopes,
            rate_limit_rpm: row.rate_limit_rpm,
            is_active: row.is_active,
            last_used_at: row.last_used_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
        })
    }
}

impl Store {
    #[tracing::instrument(skip(self), level = "debug")]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_api_key(
        &self,
        tenant_id: Uuid,
        name: &str,
        key_hash: &str,
        key_last4: &str,
        scopes: &[ApiScope],
        rate_limit_rpm: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<ApiKey> {
        let scope_strings: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            INSERT INTO api_keys
                (id, tenant_id, name, key_hash, key_last4, scopes, rate_limit_rpm, is_active, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true, $8)
            RETURNING id, tenant_id, name, key_hash, key_last4, scopes, rate_limit_rpm,
                      is_active, last_used_at, expires_at, created_at, revoked_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(name)
        .bind(key_hash)
        .bind(key_last4)
        .bind(&scope_strings)
        .bind(rate_limit_rpm)
        .bind(expires_at)
        .fetch_one(self.pool())
        .await?;
        row.try_into()
    }

    #[tracing::instrument(skip(self, key_hash), level = "debug")]
    pub async fn get_api_key_by_hash(&self, key_hash: &str) -> StoreResult<ApiKey> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"SELECT id, tenant_id, name, key_hash, key_last4, scopes, rate_limit_rpm,
                      is_active, last_used_at, expires_at, created_at, revoked_at
               FROM api_keys WHERE key_hash = $1"#,
        )
        .bind(key_hash)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    /// Fire-and-forget target: failures are logged by the caller, never
    /// surfaced to the request that triggered them.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn touch_api_key_last_used(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn revoke_api_key(&self, id: Uuid) -> StoreResult<ApiKey> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            UPDATE api_keys SET is_active = false, revoked_at = NOW()
            WHERE id = $1
            RETURNING id, tenant_id, name, key_hash, key_last4, scopes, rate_limit_rpm,
                      is_active, last_used_at, expires_at, created_at, revoked_at
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_api_keys(&self, tenant_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"SELECT id, tenant_id, name, key_hash, key_last4, scopes, rate_limit_rpm,
                      is_active, last_used_at, expires_at, created_at, revoked_at
               FROM api_keys WHERE tenant_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(ApiKey::try_from).collect()
    }
}
