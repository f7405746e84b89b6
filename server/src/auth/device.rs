use axum::body::Body;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common::{device_signature_input, hmac_sha256_hex, DEVICE_CLOCK_SKEW_SECS};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Device resolved by the signature check in `device_auth_middleware` and
/// stashed on the request as an extension, so handlers declare it in their
/// signature like any other axum extractor.
#[derive(Debug, Clone)]
pub struct AuthenticatedDevice(pub common::Device);

impl FromRequestParts<AppState> for AuthenticatedDevice {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedDevice>()
            .cloned()
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"))
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name)?.to_str().ok()
}

/// Verifies `X-Device-Id`/`X-Device-Token`/`X-Timestamp`/`X-Nonce`/
/// `X-Device-Signature` against spec.md §4.2, buffers the body to compute
/// the signature, then reconstructs the request for the downstream handler.
pub async fn device_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();

    let device_id = header_str(&parts, "x-device-id")
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"))?;
    let device_token = header_str(&parts, "x-device-token")
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"))?
        .to_string();
    let timestamp_ms: i64 = header_str(&parts, "x-timestamp")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"))?;
    let nonce = header_str(&parts, "x-nonce")
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"))?
        .to_string();
    let signature = header_str(&parts, "x-device-signature")
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "auth_missing"))?
        .to_string();

    let now_ms = Utc::now().timestamp_millis();
    if (now_ms - timestamp_ms).abs() > DEVICE_CLOCK_SKEW_SECS * 1000 {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "auth_invalid"));
    }

    let device = state
        .store
        .get_device(device_id)
        .await
        .map_err(|_| ApiError::new(StatusCode::UNAUTHORIZED, "auth_invalid"))?;

    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "invalid body"))?;

    let input = device_signature_input(device_id, timestamp_ms, &nonce, &bytes);
    let expected = hmac_sha256_hex(device.device_token.as_bytes(), &input);

    let device_token_matches: bool = device_token.as_bytes().ct_eq(device.device_token.as_bytes()).into();
    let signature_matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
    if !device_token_matches || !signature_matches {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "auth_invalid"));
    }

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(AuthenticatedDevice(device));

    Ok(next.run(req).await.into_response())
}
