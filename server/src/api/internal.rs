//! Legacy callback plane (spec.md §4.2): delivery reports from a
//! server-side Android adapter that isn't a paired device and so can't
//! speak the per-device HMAC protocol. Gated by `InternalPrincipal`
//! instead of `AuthenticatedDevice`; the handler logic is otherwise
//! identical to `device::delivery`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use common::{DeliveryReportRequest, WebhookEventType, WebhookPayload};

use crate::auth::InternalPrincipal;
use crate::error::ApiError;
use crate::state::AppState;
use crate::webhooks;

pub async fn delivery(
    State(state): State<AppState>,
    _: InternalPrincipal,
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
