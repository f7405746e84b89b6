use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use server::background::BackgroundTasks;
use server::config::Config;
use server::dispatcher::{AdapterClient, Dispatcher, DispatcherConfig};
use server::state::AppState;
use server::store::Store;
use server::{api, router, telemetry};

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    telemetry::init(&config.log_format);

    let cpus = num_cpus::get().max(4);
    tracing::info!(cpus, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cpus)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = Store::connect(&config.database_url, config.db_pool_max_connections).await?;
    store.migrate().await?;

    if std::env::args().any(|arg| arg == "--migrate-only") {
        tracing::info!("migrations applied, exiting (--migrate-only)");
        return Ok(());
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.webhook_timeout_ms))
        .build()?;
    let background = BackgroundTasks::spawn(store.clone(), http_client, config.background_queue_capacity);

    let adapter = config.android_adapter_base_url.clone().map(|base_url| {
        Arc::new(AdapterClient::new(
            base_url,
            Duration::from_millis(config.adapter_timeout_ms),
        ))
    });

    let dispatcher = Dispatcher::new(
        store.clone(),
        background.clone(),
        adapter.clone(),
        DispatcherConfig {
            poll_interval: Duration::from_millis(config.dispatcher_poll_interval_ms),
            batch_size: config.dispatcher_batch_size,
            stale_processing_threshold_ms: config.stale_processing_threshold_ms,
        },
    );
    tokio::spawn(dispatcher.run());

    tokio::spawn(router::run_stale_device_sweeper(
        store.clone(),
        Duration::from_millis(config.stale_sweep_interval_ms),
        config.stale_device_threshold_ms,
    ));

    let bind_addr: SocketAddr = config.bind_addr.parse()?;
    let app_state = AppState::new(store, background, adapter, config);

    let app: Router = api::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!(%bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
