use chrono::{DateTime, Utc};
use common::{Device, DeviceStatus};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
pub(super) struct DeviceRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    name: String,
    phone_number: Option<String>,
    device_token: String,
    status: String,
    is_shared_pool: bool,
    is_enabled: bool,
    last_seen_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<DeviceStatus>()
            .map_err(|_| StoreError::Db(sqlx::Error::Decode("bad device status".into())))?;
        Ok(Device {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            phone_number: row.phone_number,
            device_token: row.device_token,
            status,
            is_shared_pool: row.is_shared_pool,
            is_enabled: row.is_enabled,
            last_seen_at: row.last_seen_at,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const DEVICE_COLUMNS: &str = "id, tenant_id, name, phone_number, device_token, status, \
     is_shared_pool, is_enabled, last_seen_at, metadata, created_at, updated_at";

pub(super) const DEVICE_COLUMNS_PUB: &str = DEVICE_COLUMNS;

impl Store {
    #[tracing::instrument(skip(self, device_token), level = "debug")]
    pub async fn create_device(
        &self,
        tenant_id: Option<Uuid>,
        name: &str,
        phone_number: Option<&str>,
        device_token: &str,
        is_shared_pool: bool,
    ) -> StoreResult<Device> {
        if tenant_id.is_some() == is_shared_pool {
            return Err(StoreError::Validation(
                "device must be owned by exactly one of tenant_id or shared pool".into(),
            ));
        }
        let query = format!(
            r#"
            INSERT INTO devices (id, tenant_id, name, phone_number, device_token, status,
                                  is_shared_pool, is_enabled, metadata)
            VALUES ($1, $2, $3, $4, $5, 'offline', $6, true, '{{}}'::jsonb)
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(name)
            .bind(phone_number)
            .bind(device_token)
            .bind(is_shared_pool)
            .fetch_one(self.pool())
            .await?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_device(&self, id: Uuid) -> StoreResult<Device> {
        let query = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1");
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self, device_token), level = "debug")]
    pub async fn get_device_by_token(&self, device_token: &str) -> StoreResult<Device> {
        let query = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_token = $1");
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(device_token)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    /// §4.3 step 1-2: preferred device if online+enabled, else the most
    /// recently seen online+enabled device owned by the tenant.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn pick_tenant_device(
        &self,
        tenant_id: Uuid,
        preferred_device_id: Option<Uuid>,
    ) -> StoreResult<Option<Device>> {
        if let Some(preferred) = preferred_device_id {
            let query = format!(
                "SELECT {DEVICE_COLUMNS} FROM devices \
                 WHERE id = $1 AND status = 'online' AND is_enabled = true"
            );
            if let Some(row) = sqlx::query_as::<_, DeviceRow>(&query)
                .bind(preferred)
                .fetch_optional(self.pool())
                .await?
            {
                return Ok(Some(row.try_into()?));
            }
        }
        let query = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices \
             WHERE tenant_id = $1 AND status = 'online' AND is_enabled = true \
             ORDER BY last_seen_at DESC NULLS LAST LIMIT 1"
        );
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Device::try_from).transpose()
    }

    /// §4.3 step 3: fall through to the shared pool.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn pick_shared_pool_device(&self) -> StoreResult<Option<Device>> {
        let query = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices \
             WHERE is_shared_pool = true AND status = 'online' AND is_enabled = true \
             ORDER BY last_seen_at DESC NULLS LAST LIMIT 1"
        );
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .fetch_optional(self.pool())
            .await?;
        row.map(Device::try_from).transpose()
    }

    #[tracing::instrument(skip(self, metadata), level = "debug")]
    pub async fn mark_device_online(
        &self,
        id: Uuid,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Device> {
        let query = format!(
            r#"
            UPDATE devices
            SET status = 'online', last_seen_at = NOW(), updated_at = NOW(),
                metadata = metadata || COALESCE($2, '{{}}'::jsonb)
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(id)
            .bind(metadata)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    /// §4.3 stale sweep: devices unseen for `threshold_ms` are demoted.
    /// Returns the number of rows affected for logging.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn mark_stale_devices_offline(&self, threshold_ms: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET status = 'offline', updated_at = NOW()
            WHERE status = 'online'
              AND last_seen_at < NOW() - make_interval(secs => $1::double precision / 1000.0)
            "#,
        )
        .bind(threshold_ms)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, device_token), level = "debug")]
    pub async fn rotate_device_token(&self, id: Uuid, device_token: &str) -> StoreResult<Device> {
        let query = format!(
            r#"
            UPDATE devices SET device_token = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(id)
            .bind(device_token)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_devices(&self, tenant_id: Option<Uuid>) -> StoreResult<Vec<Device>> {
        let query = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices \
             WHERE ($1::uuid IS NULL OR tenant_id = $1) ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, DeviceRow>(&query)
            .bind(tenant_id)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Device::try_from).collect()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn count_online_devices(&self) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM devices WHERE status = 'online'")
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}
