//! The three authentication planes from spec.md §4.2: tenant bearer tokens,
//! device HMAC, and the internal shared-secret check for legacy callbacks.
//! Each endpoint declares which one it accepts through its handler
//! signature.

mod admin;
mod device;
mod internal;
mod rate_limit;
mod tenant;

pub use admin::AdminPrincipal;
pub use device::{device_auth_middleware, AuthenticatedDevice};
pub use internal::InternalPrincipal;
pub use rate_limit::RateLimiter;
pub use tenant::TenantPrincipal;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
    #[error("missing scope {0}")]
    MissingScope(&'static str),
    #[error("rate limited")]
    RateLimited { retry_after_secs: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}
