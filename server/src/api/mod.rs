//! Route assembly, one `AppState` across all of it: the tenant-facing
//! Public API, the HMAC-gated Device API, the internal shared-secret
//! callback plane, and the operator-facing Admin API.

pub mod admin;
pub mod device;
pub mod internal;
pub mod public;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::device_auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let public_api = Router::new()
        .route("/v1/messages", post(public::send_message).get(public::list_outbound))
        .route("/v1/messages/:id", get(public::get_message))
        .route("/v1/inbox", get(public::list_inbox));

    // Pairing is pre-auth by design: the device doesn't have a token yet.
    let device_pairing = Router::new()
        .route("/v1/devices/pair", post(device::pair_by_code))
        .route("/v1/devices/pair/token", post(device::pair_by_token));

    let device_api = Router::new()
        .route("/v1/devices/heartbeat", post(device::heartbeat))
        .route("/v1/devices/outbound", get(device::pull_outbound))
        .route("/v1/devices/outbound/ack", post(device::outbound_ack))
        .route("/v1/devices/inbound", post(device::inbound))
        .route("/v1/devices/delivery", post(device::delivery))
        .route_layer(middleware::from_fn(device_auth_middleware));

    // Legacy callback plane: a server-side adapter authenticates with the
    // internal shared secret instead of a per-device HMAC.
    let internal_api = Router::new().route("/internal/delivery", post(internal::delivery));

    let admin_api = Router::new()
        .route("/admin/tenants", post(admin::create_tenant).get(admin::list_tenants))
        .route("/admin/tenants/:id/suspend", post(admin::suspend_tenant))
        .route("/admin/tenants/:id/reactivate", post(admin::reactivate_tenant))
        .route(
            "/admin/tenants/:tenant_id/api-keys",
            post(admin::create_api_key).get(admin::list_api_keys),
        )
        .route("/admin/api-keys/:id/revoke", post(admin::revoke_api_key))
        .route("/admin/devices", post(admin::create_device).get(admin::list_devices))
        .route("/admin/devices/:id/rotate-token", post(admin::rotate_device_token))
        .route("/admin/devices/:id/pair-code", post(admin::mint_pair_code))
        .route(
            "/admin/tenants/:tenant_id/webhooks",
            post(admin::create_webhook).get(admin::list_webhooks),
        )
        .route("/admin/webhooks/:id/rotate-secret", post(admin::rotate_webhook_secret))
        .route("/admin/webhooks/:id", axum::routing::delete(admin::delete_webhook))
        .route("/admin/tenants/:tenant_id/outbound", get(admin::list_outbound_all))
        .route("/admin/tenants/:tenant_id/inbound", get(admin::list_inbound_all))
        .route("/admin/audit-log", get(admin::list_audit_log))
        .route("/admin/stats", get(admin::stats));

    Router::new()
        .route("/health", get(admin::health))
        .merge(public_api)
        .merge(device_pairing)
        .merge(device_api)
        .merge(internal_api)
        .merge(admin_api)
}
