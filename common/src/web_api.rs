//! JSON request/response shapes for the tenant-facing Public API, the
//! device-facing internal API, and the Admin API (the legacy internal
//! callback plane reuses these device-facing types), plus the webhook
//! delivery payload and the signing helper shared by whoever fires or
//! verifies a webhook.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::model::{ApiScope, DeviceStatus, OutboundStatus, RetryPolicy, StatusEvent, WebhookEventType};

type HmacSha256 = Hmac<Sha256>;

/// `hex(HMAC-SHA256(secret, body))`, used for both device-signature input
/// strings and webhook payload signing, the two HMAC schemes this gateway
/// speaks.
pub fn hmac_sha256_hex(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the exact device signature input string from spec §6:
/// `device_id:timestamp_ms:nonce:raw_body_bytes`.
pub fn device_signature_input(device_id: Uuid, timestamp_ms: i64, nonce: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!("{device_id}:{timestamp_ms}:{nonce}:").into_bytes();
    out.extend_from_slice(body);
    out
}

// ---------------------------------------------------------------------
// Public API (tenant-facing)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub message: String,
    pub sender_device_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub status: OutboundStatus,
    pub to: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub idempotent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessageView {
    pub id: Uuid,
    pub to_number: String,
    pub message_body: String,
    pub status: OutboundStatus,
    pub from_device_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub timeline: Vec<StatusEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboundMessageView {
    pub id: Uuid,
    pub from_number: String,
    pub to_number: Option<String>,
    pub message_body: String,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

// ---------------------------------------------------------------------
// Device API (HMAC-gated internal endpoints)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceInfo {
    #[serde(default)]
    pub battery_percent: Option<i32>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairByCodeRequest {
    pub code: String,
    pub device_info: Option<DeviceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairByTokenRequest {
    pub device_token: String,
    pub device_info: Option<DeviceInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairResponse {
    pub device_id: Uuid,
    pub device_token: String,
    pub status: DeviceStatus,
    pub poll_interval_seconds: u32,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HeartbeatRequest {
    pub device_info: Option<DeviceInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub status: DeviceStatus,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PulledMessage {
    pub message_id: Uuid,
    pub to_number: String,
    pub body: String,
    pub send_ref: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullOutboundResponse {
    pub items: Vec<PulledMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundAckRequest {
    pub message_id: Uuid,
    pub status: AckStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundIngestRequest {
    pub from_number: String,
    pub to_number: Option<String>,
    pub message_body: String,
    pub external_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryReportRequest {
    pub message_id: Uuid,
    pub status: String,
    pub external_ref: Option<String>,
}

// ---------------------------------------------------------------------
// Admin API
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantRequest {
    pub slug: String,
    pub name: String,
    #[serde(default = "default_plan")]
    pub plan: String,
}

fn default_plan() -> String {
    "standard".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub scopes: Vec<ApiScope>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rpm: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_rate_limit() -> i32 {
    120
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateApiKeyResponse {
    pub id: Uuid,
    pub raw_key: String,
    pub key_last4: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub is_shared_pool: bool,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDeviceResponse {
    pub id: Uuid,
    pub raw_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RotateTokenResponse {
    pub raw_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintPairCodeRequest {
    #[serde(default = "default_pair_ttl")]
    pub ttl_minutes: i64,
}

fn default_pair_ttl() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize)]
pub struct MintPairCodeResponse {
    pub raw_code: String,
    pub code_prefix: String,
    pub redemption_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookRequest {
    pub event_type: WebhookEventType,
    pub url: String,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateWebhookResponse {
    pub id: Uuid,
    pub raw_signing_secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RotateWebhookSecretResponse {
    pub raw_signing_secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: crate::model::HealthStatus,
    pub devices_online: i64,
    pub worker_heartbeat_age_ms: Option<i64>,
    pub queue_depth: i64,
    pub failures_24h: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub queued: i64,
    pub processing: i64,
    pub sent: i64,
    pub delivered: i64,
    pub failed: i64,
    pub webhooks_fired_24h: i64,
    pub active_devices: i64,
    pub background_jobs_dropped: u64,
}

// ---------------------------------------------------------------------
// Outbound webhook payload
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: WebhookEventType,
    pub message_id: Uuid,
    pub tenant_id: Uuid,
    pub to_number: Option<String>,
    pub from_number: Option<String>,
    pub status: Option<String>,
    pub error_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_hex_matches_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let sig = hmac_sha256_hex(b"key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd"
        );
    }

    #[test]
    fn device_signature_input_concatenates_in_order() {
        let id = Uuid::nil();
        let input = device_signature_input(id, 1000, "abc", b"{}");
        let expected = format!("{id}:1000:abc:{{}}");
        assert_eq!(input, expected.into_bytes());
    }
}
