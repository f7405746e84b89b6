//! Pair-code and pair-token orchestration (spec.md §4.5): generates the
//! random secrets, hashes them for storage, and wires the store + audit
//! background job together. Handlers in `api::device` and `api::admin`
//! call into this rather than touching the store directly so the
//! generate/hash/persist sequence only lives in one place.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use common::{
    DeviceInfo, MintPairCodeResponse, PairResponse, RotateTokenResponse, DEVICE_TOKEN_BYTES,
    PAIR_CODE_LEN, PAIR_CODE_PREFIX_LEN,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::background::{BackgroundJob, BackgroundTasks};
use crate::store::{Store, StoreResult};

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)[..len].to_string()
}

fn sha256_hex(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

pub fn generate_device_token() -> String {
    let mut bytes = vec![0u8; DEVICE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn device_info_json(device_info: Option<DeviceInfo>) -> Option<serde_json::Value> {
    device_info.map(|info| serde_json::to_value(info).unwrap_or(serde_json::Value::Null))
}

#[tracing::instrument(skip(store, created_by))]
pub async fn mint_pair_code(
    store: &Store,
    device_id: Uuid,
    created_by: &str,
    ttl_minutes: i64,
    redemption_base_url: &str,
) -> StoreResult<MintPairCodeResponse> {
    let raw_code = random_urlsafe(PAIR_CODE_LEN);
    let code_hash = sha256_hex(&raw_code);
    let code_prefix = raw_code[..PAIR_CODE_PREFIX_LEN].to_string();

    let pair_code = store
        .mint_pair_code(device_id, &code_hash, &code_prefix, created_by, ttl_minutes)
        .await?;

    Ok(MintPairCodeResponse {
        redemption_url: format!("{redemption_base_url}/pair?code={raw_code}"),
        code_prefix: pair_code.code_prefix,
        expires_at: pair_code.expires_at,
        raw_code,
    })
}

/// Redeems a one-time pair code, marks the device online, and fires an
/// audit-log entry through the background queue (never blocks the response
/// on the write).
#[tracing::instrument(skip(store, background, code))]
pub async fn redeem_by_code(
    store: &Store,
    background: &BackgroundTasks,
    code: &str,
    device_info: Option<DeviceInfo>,
    client_ip: Option<&str>,
    poll_interval_seconds: u32,
) -> StoreResult<PairResponse> {
    let code_hash = sha256_hex(code);
    let device = store.redeem_pair_code(&code_hash, client_ip).await?;
    let device = store
        .mark_device_online(device.id, device_info_json(device_info))
        .await?;

    background.submit(BackgroundJob::WriteAuditLog {
        tenant_id: device.tenant_id,
        actor: "device".to_string(),
        action: "device.paired_via_code".to_string(),
        resource: Some("device".to_string()),
        resource_id: Some(device.id.to_string()),
        details: serde_json::json!({ "via": "pair_code" }),
        ip_address: client_ip.map(str::to_string),
    });

    Ok(PairResponse {
        device_id: device.id,
        device_token: device.device_token,
        status: device.status,
        poll_interval_seconds,
        server_time: Utc::now(),
    })
}

/// Re-pairs an already-provisioned device by its long-lived device token
/// (e.g. after an app reinstall that retained local storage).
#[tracing::instrument(skip(store, background, device_token))]
pub async fn redeem_by_token(
    store: &Store,
    background: &BackgroundTasks,
    device_token: &str,
    device_info: Option<DeviceInfo>,
    client_ip: Option<&str>,
    poll_interval_seconds: u32,
) -> StoreResult<PairResponse> {
    let device = store.get_device_by_token(device_token).await?;
    let device = store
        .mark_device_online(device.id, device_info_json(device_info))
        .await?;

    background.submit(BackgroundJob::WriteAuditLog {
        tenant_id: device.tenant_id,
        actor: "device".to_string(),
        action: "device.paired".to_string(),
        resource: Some("device".to_string()),
        resource_id: Some(device.id.to_string()),
        details: serde_json::json!({ "via": "device_token" }),
        ip_address: client_ip.map(str::to_string),
    });

    Ok(PairResponse {
        device_id: device.id,
        device_token: device.device_token,
        status: device.status,
        poll_interval_seconds,
        server_time: Utc::now(),
    })
}

#[tracing::instrument(skip(store))]
pub async fn rotate_device_token(store: &Store, device_id: Uuid) -> StoreResult<RotateTokenResponse> {
    let raw_token = generate_device_token();
    store.rotate_device_token(device_id, &raw_token).await?;
    Ok(RotateTokenResponse { raw_token })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_urlsafe_has_requested_length() {
        let code = random_urlsafe(PAIR_CODE_LEN);
        assert_eq!(code.len(), PAIR_CODE_LEN);
    }

    #[test]
    fn device_token_is_hex_of_expected_length() {
        let token = generate_device_token();
        assert_eq!(token.len(), DEVICE_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
