//! Shared application state threaded through axum's `State` extractor.
//! Cloning is cheap: every field is an `Arc`-backed handle or a `Clone`
//! connection pool wrapper.

use std::sync::Arc;

use crate::auth::RateLimiter;
use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::dispatcher::AdapterClient;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub rate_limiter: Arc<RateLimiter>,
    pub background: BackgroundTasks,
    pub adapter: Option<Arc<AdapterClient>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Store,
        background: BackgroundTasks,
        adapter: Option<Arc<AdapterClient>>,
        config: Config,
    ) -> Self {
        Self {
            store,
            rate_limiter: Arc::new(RateLimiter::new()),
            background,
            adapter,
            config: Arc::new(config),
        }
    }
}
