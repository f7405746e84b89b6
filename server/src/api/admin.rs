//! Admin API (spec.md §4.8): CRUD over tenants/api_keys/devices/webhooks,
//! pair-code minting, cross-tenant listing, audit reads, and the health/
//! stats rollups. Every mutation fires an audit-log background job with
//! the resolved `AdminPrincipal.actor`, the action name, and the request IP.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use common::{
    AuditLog, CreateApiKeyRequest, CreateApiKeyResponse, CreateDeviceRequest, CreateDeviceResponse,
    CreateTenantRequest, CreateWebhookRequest, CreateWebhookResponse, Device, HealthResponse,
    HealthStatus, InboundMessageView, ListQuery, MintPairCodeRequest, MintPairCodeResponse,
    OutboundMessageView, Page, RotateTokenResponse, RotateWebhookSecretResponse, StatsResponse,
    Tenant, Webhook, API_KEY_HEX_LEN, API_KEY_PREFIX, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
    PAIR_CODE_TTL_MAX_MINUTES, PAIR_CODE_TTL_MIN_MINUTES, WEBHOOK_SECRET_BYTES,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::AdminPrincipal;
use crate::background::BackgroundJob;
use crate::error::ApiError;
use crate::pairing;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct DeviceListQuery {
    pub tenant_id: Option<Uuid>,
}

fn clamp_page(query: &ListQuery) -> (i64, i64) {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

fn generate_api_key() -> (String, String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw_key = format!("{API_KEY_PREFIX}{}", hex::encode(bytes));
    debug_assert_eq!(raw_key.len(), API_KEY_PREFIX.len() + API_KEY_HEX_LEN);
    let key_hash = hex::encode(Sha256::digest(raw_key.as_bytes()));
    let key_last4 = raw_key[raw_key.len() - 4..].to_string();
    (raw_key, key_hash, key_last4)
}

fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; WEBHOOK_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn audit(
    state: &AppState,
    admin: &AdminPrincipal,
    addr: SocketAddr,
    tenant_id: Option<Uuid>,
    action: &str,
    resource: &str,
    resource_id: impl ToString,
) {
    state.background.submit(BackgroundJob::WriteAuditLog {
        tenant_id,
        actor: admin.actor.clone(),
        action: action.to_string(),
        resource: Some(resource.to_string()),
        resource_id: Some(resource_id.to_string()),
        details: serde_json::json!({}),
        ip_address: Some(addr.ip().to_string()),
    });
}

// ---------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------

pub async fn create_tenant(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>), ApiError> {
    let tenant = state
        .store
        .create_tenant(&request.slug, &request.name, &request.plan)
        .await?;
    audit(&state, &admin, addr, Some(tenant.id), "tenant.created", "tenant", tenant.id);
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn list_tenants(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
) -> Result<Json<Vec<Tenant>>, ApiError> {
    Ok(Json(state.store.list_tenants().await?))
}

pub async fn suspend_tenant(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tenant>, ApiError> {
    let tenant = state.store.suspend_tenant(id).await?;
    audit(&state, &admin, addr, Some(id), "tenant.suspended", "tenant", id);
    Ok(Json(tenant))
}

pub async fn reactivate_tenant(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tenant>, ApiError> {
    let tenant = state.store.reactivate_tenant(id).await?;
    audit(&state, &admin, addr, Some(id), "tenant.reactivated", "tenant", id);
    Ok(Json(tenant))
}

// ---------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------

pub async fn create_api_key(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), ApiError> {
    let (raw_key, key_hash, key_last4) = generate_api_key();
    let api_key = state
        .store
        .create_api_key(
            tenant_id,
            &request.name,
            &key_hash,
            &key_last4,
            &request.scopes,
            request.rate_limit_rpm,
            request.expires_at,
        )
        .await?;
    audit(&state, &admin, addr, Some(tenant_id), "api_key.created", "api_key", api_key.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            id: api_key.id,
            raw_key,
            key_last4: api_key.key_last4,
        }),
    ))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Vec<common::ApiKey>>, ApiError> {
    Ok(Json(state.store.list_api_keys(tenant_id).await?))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<Json<common::ApiKey>, ApiError> {
    let api_key = state.store.revoke_api_key(id).await?;
    audit(&state, &admin, addr, Some(api_key.tenant_id), "api_key.revoked", "api_key", id);
    Ok(Json(api_key))
}

// ---------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------

pub async fn create_device(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<CreateDeviceResponse>), ApiError> {
    let raw_token = pairing::generate_device_token();
    let device = state
        .store
        .create_device(
            request.tenant_id,
            &request.name,
            request.phone_number.as_deref(),
            &raw_token,
            request.is_shared_pool,
        )
        .await?;
    audit(&state, &admin, addr, request.tenant_id, "device.created", "device", device.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateDeviceResponse {
            id: device.id,
            raw_token,
        }),
    ))
}

/// `tenant_id=<uuid>` lists one tenant's devices; omitted lists the shared pool.
pub async fn list_devices(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Query(query): Query<DeviceListQuery>,
) -> Result<Json<Vec<Device>>, ApiError> {
    Ok(Json(state.store.list_devices(query.tenant_id).await?))
}

pub async fn rotate_device_token(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<Json<RotateTokenResponse>, ApiError> {
    let response = pairing::rotate_device_token(&state.store, id).await?;
    audit(&state, &admin, addr, None, "device.token_rotated", "device", id);
    Ok(Json(response))
}

pub async fn mint_pair_code(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
    Json(request): Json<MintPairCodeRequest>,
) -> Result<Json<MintPairCodeResponse>, ApiError> {
    let ttl_minutes = request
        .ttl_minutes
        .clamp(PAIR_CODE_TTL_MIN_MINUTES, PAIR_CODE_TTL_MAX_MINUTES);
    let response = pairing::mint_pair_code(
        &state.store,
        id,
        &admin.actor,
        ttl_minutes,
        &state.config.public_base_url,
    )
    .await?;
    audit(&state, &admin, addr, None, "device.pair_code_minted", "device", id);
    Ok(Json(response))
}

// ---------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------

pub async fn create_webhook(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreateWebhookResponse>), ApiError> {
    let raw_signing_secret = generate_webhook_secret();
    let webhook = state
        .store
        .create_webhook(
            tenant_id,
            request.event_type,
            &request.url,
            &raw_signing_secret,
            request.retry_policy.unwrap_or_default(),
        )
        .await?;
    audit(&state, &admin, addr, Some(tenant_id), "webhook.created", "webhook", webhook.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateWebhookResponse {
            id: webhook.id,
            raw_signing_secret,
        }),
    ))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Vec<Webhook>>, ApiError> {
    Ok(Json(state.store.list_webhooks(tenant_id).await?))
}

pub async fn rotate_webhook_secret(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<Json<RotateWebhookSecretResponse>, ApiError> {
    let raw_signing_secret = generate_webhook_secret();
    let webhook = state.store.rotate_webhook_secret(id, &raw_signing_secret).await?;
    audit(&state, &admin, addr, Some(webhook.tenant_id), "webhook.secret_rotated", "webhook", id);
    Ok(Json(RotateWebhookSecretResponse { raw_signing_secret }))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_webhook(id).await?;
    audit(&state, &admin, addr, None, "webhook.deleted", "webhook", id);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Cross-tenant listing and audit
// ---------------------------------------------------------------------

pub async fn list_outbound_all(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<OutboundMessageView>>, ApiError> {
    let (limit, offset) = clamp_page(&query);
    let (messages, total) = state
        .store
        .list_outbound(tenant_id, query.status.as_deref(), limit, offset)
        .await?;
    let items = messages
        .into_iter()
        .map(|message| OutboundMessageView {
            id: message.id,
            to_number: message.to_number,
            message_body: message.message_body,
            status: message.status,
            from_device_id: message.from_device_id,
            external_id: message.external_id,
            attempts: message.attempts,
            last_error: message.last_error,
            error_code: message.error_code,
            created_at: message.created_at,
            updated_at: message.updated_at,
            delivered_at: message.delivered_at,
            failed_at: message.failed_at,
            timeline: Vec::new(),
        })
        .collect();
    Ok(Json(Page {
        items,
        limit,
        offset,
        total,
    }))
}

pub async fn list_inbound_all(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<InboundMessageView>>, ApiError> {
    let (limit, offset) = clamp_page(&query);
    let (messages, total) = state.store.list_inbound(tenant_id, limit, offset).await?;
    let items = messages
        .into_iter()
        .map(|message| InboundMessageView {
            id: message.id,
            from_number: message.from_number,
            to_number: message.to_number,
            message_body: message.message_body,
            external_id: message.external_id,
            created_at: message.created_at,
        })
        .collect();
    Ok(Json(Page {
        items,
        limit,
        offset,
        total,
    }))
}

pub async fn list_audit_log(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let (limit, offset) = clamp_page(&query);
    Ok(Json(state.store.list_audit_log(None, limit, offset).await?))
}

// ---------------------------------------------------------------------
// Health / stats
// ---------------------------------------------------------------------

/// `/health` rollup, per spec.md §6.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let devices_online = state.store.count_online_devices().await?;
    let worker_health = state.store.get_worker_health().await?;
    let worker_heartbeat_age_ms = worker_health
        .as_ref()
        .map(|health| (Utc::now() - health.last_heartbeat).num_milliseconds());
    let queue_depth = state.store.count_outbound_by_status("queued").await?;
    let failures_24h = state
        .store
        .count_failures_since(Utc::now() - chrono::Duration::hours(24))
        .await?;

    let worker_healthy = worker_heartbeat_age_ms.map(|age| age <= 120_000).unwrap_or(false);
    let within_limits = queue_depth <= 100 && failures_24h <= 50;

    let status = if devices_online >= 1 && worker_healthy && within_limits {
        HealthStatus::Online
    } else if devices_online >= 1 || worker_healthy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Offline
    };

    Ok(Json(HealthResponse {
        status,
        devices_online,
        worker_heartbeat_age_ms,
        queue_depth,
        failures_24h,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
) -> Result<Json<StatsResponse>, ApiError> {
    let queued = state.store.count_outbound_by_status("queued").await?;
    let processing = state.store.count_outbound_by_status("processing").await?;
    let sent = state.store.count_outbound_by_status("sent").await?;
    let delivered = state.store.count_outbound_by_status("delivered").await?;
    let failed = state.store.count_outbound_by_status("failed").await?;
    let webhooks_fired_24h = state
        .store
        .count_webhooks_fired_since(Utc::now() - chrono::Duration::hours(24))
        .await?;
    let active_devices = state.store.count_online_devices().await?;

    Ok(Json(StatsResponse {
        queued,
        processing,
        sent,
        delivered,
        failed,
        webhooks_fired_24h,
        active_devices,
        background_jobs_dropped: state.background.dropped_count(),
    }))
}
