//! Device-selection policy (spec.md §4.3) and the stale-device sweeper.

use std::time::Duration;

use common::Device;
use uuid::Uuid;

use crate::store::{Store, StoreResult};

/// `PickDevice(tenant_id, preferred?)`: preferred online device, else the
/// tenant's most-recently-seen online device, else the shared pool's.
/// `None` means the caller must fail the attempt with `NO_DEVICE`.
pub async fn pick_device(
    store: &Store,
    tenant_id: Uuid,
    preferred_device_id: Option<Uuid>,
) -> StoreResult<Option<Device>> {
    if let Some(device) = store.pick_tenant_device(tenant_id, preferred_device_id).await? {
        return Ok(Some(device));
    }
    store.pick_shared_pool_device().await
}

/// Background timer: every `interval`, demotes devices unseen for
/// `stale_threshold_ms` from `online` to `offline`.
pub async fn run_stale_device_sweeper(store: Store, interval: Duration, stale_threshold_ms: i64) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match store.mark_stale_devices_offline(stale_threshold_ms).await {
            Ok(0) => {}
            Ok(affected) => tracing::info!(affected, "swept stale devices offline"),
            Err(err) => tracing::warn!(error = %err, "stale device sweep failed"),
        }
    }
}
