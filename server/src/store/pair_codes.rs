use chrono::{DateTime, Utc};
use common::{Device, PairCode};
use uuid::Uuid;

use super::devices::DEVICE_COLUMNS_PUB;
use super::{Store, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct PairCodeRow {
    id: Uuid,
    code_hash: String,
    code_prefix: String,
    device_id: Uuid,
    created_by: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    used_by_ip: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PairCodeRow> for PairCode {
    fn from(row: PairCodeRow) -> Self {
        PairCode {
            id: row.id,
            code_hash: row.code_hash,
            code_prefix: row.code_prefix,
            device_id: row.device_id,
            created_by: row.created_by,
            expires_at: row.expires_at,
            used_at: row.used_at,
            used_by_ip: row.used_by_ip,
            created_at: row.created_at,
        }
    }
}

impl Store {
    #[tracing::instrument(skip(self, code_hash), level = "debug")]
    pub async fn mint_pair_code(
        &self,
        device_id: Uuid,
        code_hash: &str,
        code_prefix: &str,
        created_by: &str,
        ttl_minutes: i64,
    ) -> StoreResult<PairCode> {
        let row = sqlx::query_as::<_, PairCodeRow>(
            r#"
            INSERT INTO pair_codes (id, code_hash, code_prefix, device_id, created_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, NOW() + make_interval(mins => $6))
            RETURNING id, code_hash, code_prefix, device_id, created_by, expires_at,
                      used_at, used_by_ip, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code_hash)
        .bind(code_prefix)
        .bind(device_id)
        .bind(created_by)
        .bind(ttl_minutes)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into())
    }

    /// Atomic at-most-once redemption (spec.md §4.5): the single UPDATE's
    /// `WHERE` clause is the entire correctness argument, so two concurrent
    /// redeemers can never both succeed.
    #[tracing::instrument(skip(self, code_hash), level = "debug")]
    pub async fn redeem_pair_code(
        &self,
        code_hash: &str,
        used_by_ip: Option<&str>,
    ) -> StoreResult<Device> {
        let mut tx = self.pool().begin().await?;
        let redeemed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE pair_codes
            SET used_at = NOW(), used_by_ip = $2
            WHERE code_hash = $1 AND used_at IS NULL AND expires_at > NOW()
            RETURNING device_id
            "#,
        )
        .bind(code_hash)
        .bind(used_by_ip)
        .fetch_optional(&mut *tx)
        .await?;
        let (device_id,) = redeemed.ok_or(StoreError::NotFound)?;

        let query = format!("SELECT {DEVICE_COLUMNS_PUB} FROM devices WHERE id = $1");
        let device_row = sqlx::query_as::<_, super::devices::DeviceRow>(&query)
            .bind(device_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        tx.commit().await?;
        device_row.try_into()
    }
}
