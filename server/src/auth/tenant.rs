use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{ApiKey, ApiScope, TenantStatus};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::background::BackgroundJob;
use crate::state::AppState;

use super::AuthError;

/// The resolved `{api_key, tenant_id, scopes}` principal attached to a
/// tenant-authenticated request (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct TenantPrincipal {
    pub api_key: ApiKey,
}

impl TenantPrincipal {
    pub fn tenant_id(&self) -> Uuid {
        self.api_key.tenant_id
    }

    pub fn require_scope(&self, scope: ApiScope) -> Result<(), AuthError> {
        if self.api_key.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::MissingScope(scope_name(scope)))
        }
    }
}

fn scope_name(scope: ApiScope) -> &'static str {
    match scope {
        ApiScope::SmsSend => "sms:send",
        ApiScope::SmsRead => "sms:read",
        ApiScope::SmsInbox => "sms:inbox",
    }
}

impl FromRequestParts<AppState> for TenantPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or(AuthError::Missing)?
            .to_str()
            .map_err(|_| AuthError::Invalid)?;

        let raw_key = header.strip_prefix("Bearer ").ok_or(AuthError::Invalid)?;
        if !raw_key.starts_with(common::API_KEY_PREFIX) {
            return Err(AuthError::Invalid);
        }

        let key_hash = hex::encode(Sha256::digest(raw_key.as_bytes()));
        let api_key = state.store.get_api_key_by_hash(&key_hash).await.map_err(|err| {
            match err {
                crate::store::StoreError::NotFound => AuthError::Invalid,
                other => AuthError::Store(other),
            }
        })?;

        if !api_key.is_active {
            return Err(AuthError::Invalid);
        }
        if let Some(expires_at) = api_key.expires_at {
            if expires_at <= chrono::Utc::now() {
                return Err(AuthError::Invalid);
            }
        }

        let tenant = state
            .store
            .get_tenant(api_key.tenant_id)
            .await
            .map_err(|_| AuthError::Invalid)?;
        if tenant.status != TenantStatus::Active {
            return Err(AuthError::Invalid);
        }

        state
            .rate_limiter
            .check(api_key.id, api_key.rate_limit_rpm)?;

        state
            .background
            .submit(BackgroundJob::TouchApiKeyLastUsed { id: api_key.id });

        Ok(TenantPrincipal { api_key })
    }
}
