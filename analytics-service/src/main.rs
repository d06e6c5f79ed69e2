use std::sync::Arc;

use analytics_service::{
    cache::SiteTables,
    config::AppConfig,
    metrics_server, observability,
    server::{self, AppState},
};
use anyhow::Result;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8088";

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let offset = cfg.site.offset()?;
    let state = Arc::new(AppState {
        tables: SiteTables::new(cfg.site.flow_path.clone(), cfg.site.quality_path.clone(), offset),
        settings: cfg.dispatch_settings(),
        lookback: cfg.lookback(),
    });

    // Parse once up front so a broken export fails at startup rather than on
    // the first query.
    let warm = Arc::clone(&state);
    let (flow, quality) = tokio::task::spawn_blocking(move || warm.tables.load()).await??;
    tracing::info!(flow_rows = flow.len(), quality_rows = quality.len(), "site tables loaded");

    let bind_addr = cfg
        .server
        .as_ref()
        .map(|s| s.bind_addr.as_str())
        .unwrap_or(DEFAULT_BIND_ADDR);
    server::serve(bind_addr, state).await
}
