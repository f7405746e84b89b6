//! Environment-driven startup configuration, deserialized once via `envy`
//! rather than read ad hoc at each call site.

use serde::Deserialize;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_pool_max_connections() -> u32 {
    20
}

fn default_dispatcher_poll_interval_ms() -> u64 {
    5_000
}

fn default_dispatcher_batch_size() -> i64 {
    5
}

fn default_dispatcher_lease_timeout_ms() -> u64 {
    15_000
}

fn default_stale_processing_threshold_ms() -> i64 {
    60_000
}

fn default_stale_device_threshold_ms() -> i64 {
    120_000
}

fn default_stale_sweep_interval_ms() -> u64 {
    60_000
}

fn default_default_tenant_slug() -> String {
    "getouch".to_string()
}

fn default_pair_code_poll_interval_seconds() -> u32 {
    10
}

fn default_background_queue_capacity() -> usize {
    256
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

fn default_adapter_timeout_ms() -> u64 {
    15_000
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Typed startup configuration. Fields with no `#[serde(default...)]` are
/// mandatory and `envy::from_env` fails fast if they are missing.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_pool_max_connections")]
    pub db_pool_max_connections: u32,

    /// Accepted as a bearer token on Admin API endpoints, per spec.md §6.
    pub admin_token: Option<String>,

    /// Shared secret for the legacy internal callback plane (spec.md §4.2).
    pub internal_shared_secret: Option<String>,

    /// Base URL of a server-side Android adapter for push-mode dispatch.
    /// Absent ⇒ pull-mode only.
    pub android_adapter_base_url: Option<String>,

    #[serde(default = "default_default_tenant_slug")]
    pub default_tenant_slug: String,

    #[serde(default = "default_dispatcher_poll_interval_ms")]
    pub dispatcher_poll_interval_ms: u64,

    #[serde(default = "default_dispatcher_batch_size")]
    pub dispatcher_batch_size: i64,

    #[serde(default = "default_dispatcher_lease_timeout_ms")]
    pub dispatcher_lease_timeout_ms: u64,

    #[serde(default = "default_stale_processing_threshold_ms")]
    pub stale_processing_threshold_ms: i64,

    #[serde(default = "default_stale_device_threshold_ms")]
    pub stale_device_threshold_ms: i64,

    #[serde(default = "default_stale_sweep_interval_ms")]
    pub stale_sweep_interval_ms: u64,

    #[serde(default = "default_pair_code_poll_interval_seconds")]
    pub pair_code_poll_interval_seconds: u32,

    #[serde(default = "default_background_queue_capacity")]
    pub background_queue_capacity: usize,

    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Used only to build the `redemption_url` a freshly-minted pair code
    /// is returned with; never dereferenced server-side.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_env_vars_absent() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let config: Config = envy::from_env().unwrap();
        assert_eq!(config.dispatcher_batch_size, 5);
        assert_eq!(config.default_tenant_slug, "getouch");
        std::env::remove_var("DATABASE_URL");
    }
}
