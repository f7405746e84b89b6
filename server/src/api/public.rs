//! Tenant-facing Public API (spec.md §4.7): send/get/list, scope-gated by
//! `TenantPrincipal`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use common::{
    is_e164, is_valid_message_body, ApiScope, InboundMessageView, ListQuery, OutboundMessageView,
    Page, SendMessageRequest, SendMessageResponse, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT,
};
use uuid::Uuid;

use crate::auth::TenantPrincipal;
use crate::error::ApiError;
use crate::state::AppState;

fn clamp_page(query: &ListQuery) -> (i64, i64) {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// `Idempotency-Key` header overrides the body field, per spec.md §4.7.
fn resolve_idempotency_key(headers: &HeaderMap, body_key: Option<String>) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(body_key)
}

pub async fn send_message(
    State(state): State<AppState>,
    principal: TenantPrincipal,
    headers: HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    principal.require_scope(ApiScope::SmsSend)?;

    if !is_e164(&request.to) {
        return Err(ApiError::validation("to must be E.164"));
    }
    if !is_valid_message_body(&request.message) {
        return Err(ApiError::validation("message must be 1-1600 characters"));
    }

    let idempotency_key = resolve_idempotency_key(&headers, request.idempotency_key);

    let result = state
        .store
        .create_outbound(
            principal.tenant_id(),
            &request.to,
            &request.message,
            request.sender_device_id,
            idempotency_key.as_deref(),
            DEFAULT_MAX_ATTEMPTS,
            request.metadata.unwrap_or(serde_json::json!({})),
        )
        .await?;

    let status_code = if result.idempotent {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status_code,
        Json(SendMessageResponse {
            message_id: result.message.id,
            status: result.message.status,
            to: result.message.to_number,
            created_at: result.message.created_at,
            idempotent: result.idempotent,
        }),
    ))
}

pub async fn get_message(
    State(state): State<AppState>,
    principal: TenantPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboundMessageView>, ApiError> {
    principal.require_scope(ApiScope::SmsRead)?;

    let message = state.store.get_outbound(principal.tenant_id(), id).await?;
    let timeline = state.store.get_timeline(message.id).await?;

    Ok(Json(OutboundMessageView {
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
        timeline,
    }))
}

pub async fn list_outbound(
    State(state): State<AppState>,
    principal: TenantPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<OutboundMessageView>>, ApiError> {
    principal.require_scope(ApiScope::SmsRead)?;

    let (limit, offset) = clamp_page(&query);
    let (messages, total) = state
        .store
        .list_outbound(principal.tenant_id(), query.status.as_deref(), limit, offset)
        .await?;

    let mut items = Vec::with_capacity(messages.len());
    for message in messages {
        items.push(OutboundMessageView {
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
        });
    }

    Ok(Json(Page {
        items,
        limit,
        offset,
        total,
    }))
}

pub async fn list_inbox(
    State(state): State<AppState>,
    principal: TenantPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<InboundMessageView>>, ApiError> {
    principal.require_scope(ApiScope::SmsInbox)?;

    let (limit, offset) = clamp_page(&query);
    let (messages, total) = state
        .store
        .list_inbound(principal.tenant_id(), limit, offset)
        .await?;

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

