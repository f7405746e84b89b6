//! Admin API gate. Per spec.md §6, admin authentication is satisfied by any
//! of: a bearer token match against `ADMIN_TOKEN`, or an upstream reverse
//! proxy's `Cf-Access-Authenticated-User-Email` header. The core never
//! validates that header's signature; it trusts the proxy the operator
//! put in front of it, by configuration, not by parsing a cookie itself.
//! Session-cookie acceptance is left to that proxy rather than reimplemented
//! here (see DESIGN.md).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::AuthError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct AdminPrincipal {
    pub actor: String,
}

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(email) = parts
            .headers
            .get("cf-access-authenticated-user-email")
            .and_then(|v| v.to_str().ok())
        {
            return Ok(AdminPrincipal {
                actor: email.to_string(),
            });
        }

        let admin_token = state.config.admin_token.as_deref().ok_or(AuthError::Missing)?;
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or(AuthError::Missing)?
            .to_str()
            .map_err(|_| AuthError::Invalid)?;
        let token = header.strip_prefix("Bearer ").ok_or(AuthError::Invalid)?;

        use subtle::ConstantTimeEq;
        let matches: bool = token.as_bytes().ct_eq(admin_token.as_bytes()).into();
        if !matches {
            return Err(AuthError::Invalid);
        }

        Ok(AdminPrincipal {
            actor: "admin_token".to_string(),
        })
    }
}
