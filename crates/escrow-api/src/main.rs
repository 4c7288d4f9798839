//! # escrow-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the escrow sync API.

use escrow_api::state::{build_ledger, build_store, build_sync, AppConfig, AppState, LogFormat};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(?config, "configuration loaded");

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {e}. /metrics will return 503.");
            None
        }
    };

    let db_pool = escrow_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let ledger = build_ledger(config.ledger_mode).map_err(|e| {
        tracing::error!("Failed to create ledger client: {e}");
        e
    })?;

    match &ledger {
        Some(ledger) => tracing::info!(
            adapter = ledger.name(),
            claim_lease = ?config.claim_lease,
            "ledger mirroring enabled"
        ),
        None => tracing::warn!("Ledger not configured. Premium audit endpoints will return 503."),
    }
    let sync = build_sync(build_store(db_pool.as_ref()), ledger, &config);

    let port = config.port;
    let mut state = AppState::new(sync, config);
    if let Some(pool) = db_pool {
        state = state.with_db_pool(pool);
    }
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }

    let app = escrow_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Escrow API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
