//! Internal shared-secret plane (spec.md §4.2): `X-Sms-Internal-Secret`,
//! used by a server-side Android adapter calling back into non-device
//! endpoints instead of speaking the per-device HMAC protocol. Disabled
//! (always rejects) unless `INTERNAL_SHARED_SECRET` is configured.

use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use super::AuthError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct InternalPrincipal;

impl FromRequestParts<AppState> for InternalPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let configured = state.config.internal_shared_secret.as_deref().ok_or(AuthError::Missing)?;
        let header = parts
            .headers
            .get("x-sms-internal-secret")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;

        let matches: bool = header.as_bytes().ct_eq(configured.as_bytes()).into();
        if !matches {
            return Err(AuthError::Invalid);
        }

        let peer_is_local = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().is_loopback())
            .unwrap_or(false);
        if !peer_is_local {
            return Err(AuthError::Invalid);
        }

        Ok(InternalPrincipal)
    }
}
