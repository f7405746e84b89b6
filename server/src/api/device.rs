//! Device-facing internal API (spec.md §4.5, §4.7): pairing, heartbeat,
//! pull-outbound, ack, inbound ingest, delivery reports. Every route here
//! runs behind `device_auth_middleware`, so handlers receive an already
//! HMAC-verified `AuthenticatedDevice`.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use common::{
    AckStatus, DeliveryReportRequest, HeartbeatRequest, HeartbeatResponse, InboundIngestRequest,
    OutboundAckRequest, PairByCodeRequest, PairByTokenRequest, PairResponse, PullOutboundResponse,
    PulledMessage, WebhookEventType, WebhookPayload, PULL_OUTBOUND_BATCH_SIZE,
};

use crate::auth::AuthenticatedDevice;
use crate::error::ApiError;
use crate::pairing;
use crate::state::AppState;
use crate::webhooks;

pub async fn pair_by_code(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<PairByCodeRequest>,
) -> Result<Json<PairResponse>, ApiError> {
    let response = pairing::redeem_by_code(
        &state.store,
        &state.background,
        &request.code,
        request.device_info,
        Some(&addr.ip().to_string()),
        state.config.pair_code_poll_interval_seconds,
    )
    .await
    // Unknown/expired/already-used all collapse into one generic error so
    // a caller cannot distinguish them (spec.md §4.5).
    .map_err(|_| ApiError::new(StatusCode::UNAUTHORIZED, "invalid"))?;
    Ok(Json(response))
}

pub async fn pair_by_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<PairByTokenRequest>,
) -> Result<Json<PairResponse>, ApiError> {
    let response = pairing::redeem_by_token(
        &state.store,
        &state.background,
        &request.device_token,
        request.device_info,
        Some(&addr.ip().to_string()),
        state.config.pair_code_poll_interval_seconds,
    )
    .await
    .map_err(|_| ApiError::new(StatusCode::UNAUTHORIZED, "invalid"))?;
    Ok(Json(response))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    AuthenticatedDevice(device): AuthenticatedDevice,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let metadata = request
        .device_info
        .map(|info| serde_json::to_value(info).unwrap_or(serde_json::Value::Null));
    let device = state.store.mark_device_online(device.id, metadata).await?;
    Ok(Json(HeartbeatResponse {
        status: device.status,
        server_time: Utc::now(),
    }))
}

/// The pull IS the lease (spec.md §4.7): this handler's single query both
/// selects and assigns the returned messages, so the dispatcher never
/// double-leases them.
pub async fn pull_outbound(
    State(state): State<AppState>,
    AuthenticatedDevice(device): AuthenticatedDevice,
) -> Result<Json<PullOutboundResponse>, ApiError> {
    let messages = state
        .store
        .pull_lease_for_device(&device, PULL_OUTBOUND_BATCH_SIZE)
        .await?;

    let items = messages
        .into_iter()
        .map(|message| PulledMessage {
            message_id: message.id,
            to_number: message.to_number,
            body: message.message_body,
            send_ref: message.id.to_string(),
        })
        .collect();

    Ok(Json(PullOutboundResponse { items }))
}

pub async fn outbound_ack(
    State(state): State<AppState>,
    AuthenticatedDevice(device): AuthenticatedDevice,
    Json(request): Json<OutboundAckRequest>,
) -> Result<StatusCode, ApiError> {
    match request.status {
        AckStatus::Sent => {
            let message = state
                .store
                .mark_sent(request.message_id, request.external_ref.as_deref(), device.id)
                .await?;
            if message.status == common::OutboundStatus::Sent {
                webhooks::trigger(
                    &state.store,
                    &state.background,
                    message.tenant_id,
                    WebhookEventType::SmsSent,
                    WebhookPayload {
                        event: WebhookEventType::SmsSent,
                        message_id: message.id,
                        tenant_id: message.tenant_id,
                        to_number: Some(message.to_number),
                        from_number: None,
                        status: Some(message.status.to_string()),
                        error_code: None,
                        occurred_at: Utc::now(),
                    },
                )
                .await;
            }
        }
        AckStatus::Failed => {
            let permanent = request
                .error_code
                .as_deref()
                .map(common::is_permanent_error_code)
                .unwrap_or(false);
            let message = state
                .store
                .mark_failed(
                    request.message_id,
                    request.error_message.as_deref().unwrap_or("device reported failure"),
                    request.error_code.as_deref(),
                    permanent,
                )
                .await?;
            if message.status == common::OutboundStatus::Failed {
                webhooks::trigger(
                    &state.store,
                    &state.background,
                    message.tenant_id,
                    WebhookEventType::SmsFailed,
                    WebhookPayload {
                        event: WebhookEventType::SmsFailed,
                        message_id: message.id,
                        tenant_id: message.tenant_id,
                        to_number: Some(message.to_number),
                        from_number: None,
                        status: Some(message.status.to_string()),
                        error_code: message.error_code,
                        occurred_at: Utc::now(),
                    },
                )
                .await;
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn inbound(
    State(state): State<AppState>,
    AuthenticatedDevice(device): AuthenticatedDevice,
    Json(request): Json<InboundIngestRequest>,
) -> Result<StatusCode, ApiError> {
    let tenant_id = match device.tenant_id {
        Some(tenant_id) => tenant_id,
        None => {
            state
                .store
                .get_tenant_by_slug(&state.config.default_tenant_slug)
                .await?
                .id
        }
    };

    let result = state
        .store
        .create_inbound(
            tenant_id,
            Some(device.id),
            &request.from_number,
            request.to_number.as_deref(),
            &request.message_body,
            request.external_id.as_deref(),
            request.metadata.unwrap_or(serde_json::json!({})),
        )
        .await?;

    if result.fresh {
        webhooks::trigger(
            &state.store,
            &state.background,
            tenant_id,
            WebhookEventType::SmsInbound,
            WebhookPayload {
                event: WebhookEventType::SmsInbound,
                message_id: result.message.id,
                tenant_id,
                to_number: result.message.to_number.clone(),
                from_number: Some(result.message.from_number.clone()),
                status: None,
                error_code: None,
                occurred_at: Utc::now(),
            },
        )
        .await;
    }

    Ok(StatusCode::CREATED)
}

pub async fn delivery(
    State(state): State<AppState>,
    AuthenticatedDevice(_device): AuthenticatedDevice,
    Json(request): Json<DeliveryReportRequest>,
) -> Result<StatusCode, ApiError> {
    let result = state.store.mark_delivered(request.message_id).await?;
    if result.delivered {
        let message = result.message;
        webhooks::trigger(
            &state.store,
            &state.background,
            message.tenant_id,
            WebhookEventType::SmsDelivered,
            WebhookPayload {
                event: WebhookEventType::SmsDelivered,
                message_id: message.id,
                tenant_id: message.tenant_id,
                to_number: Some(message.to_number),
                from_number: None,
                status: Some(message.status.to_string()),
                error_code: None,
                occurred_at: Utc::now(),
            },
        )
        .await;
    }
    Ok(StatusCode::NO_CONTENT)
}
