use analytics_service::{
    analytics::{
        alert_digest, breach_events_with, daily_compliance, daily_totals, flow_anomalies_with,
        hour_dow_heatmap, humidity_vs_flow, monthly_rollups, shift_aggregates,
    },
    config::AppConfig,
    observability,
    sinks::CsvArtifactSink,
    sources::{load_flow_csv, load_quality_csv},
    transform, AnalyticsError,
};
use anyhow::Result;
use std::{env, path::PathBuf};

/// Batch export of every analytic as CSV artifacts.
///
/// Usage: `run_analytics [flow_csv quality_csv]`; paths default to the
/// `[site]` section of the config.
fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let offset = cfg.site.offset()?;

    let args: Vec<String> = env::args().collect();
    let (flow_path, quality_path): (PathBuf, PathBuf) = match args.as_slice() {
        [_, flow, quality, ..] => (flow.into(), quality.into()),
        _ => (cfg.site.flow_path.clone(), cfg.site.quality_path.clone()),
    };

    let flow = load_flow_csv(&flow_path, offset)?;
    transform::validate_flow(&flow, offset)?;
    let quality = load_quality_csv(&quality_path, offset)?;
    transform::validate_quality(&quality, offset)?;
    tracing::info!(flow_rows = flow.len(), quality_rows = quality.len(), "site tables loaded");

    let sink = CsvArtifactSink::new(&cfg.artifacts.output_dir)?;

    // flow
    sink.write_table("flow_daily", &daily_totals(&flow))?;
    sink.write_table("flow_shift", &shift_aggregates(&flow))?;
    sink.write_heatmap("flow_heatmap_hour_dow", &hour_dow_heatmap(&flow))?;
    sink.write_table("flow_anomalies", &flow_anomalies_with(&flow, &cfg.anomaly_options()))?;

    // quality
    sink.write_table("quality_daily_compliance", &daily_compliance(&quality))?;
    let events = breach_events_with(&quality, &cfg.breach_options());
    sink.write_table("quality_breach_events", &events)?;

    let digest = alert_digest(&quality, cfg.lookback());
    sink.write_table("quality_latest_breaches", &digest.breaches.rows)?;
    sink.write_table("recommendations", &digest.recommendations)?;

    // seasonal
    let rollups = monthly_rollups(&flow, &quality);
    sink.write_table("seasonal_flow_month", &rollups.flow)?;
    sink.write_table("seasonal_quality_month", &rollups.quality)?;

    match humidity_vs_flow(&flow, &quality, &cfg.site.humidity_parameter) {
        Ok(report) => {
            sink.write_table("humidity_vs_flow_daily", &report.rows)?;
            tracing::info!(
                correlation = report.correlation,
                p_value = report.p_value,
                days = report.rows.len(),
                "humidity vs flow correlation"
            );
        }
        Err(
            e @ (AnalyticsError::InsufficientData { .. } | AnalyticsError::DegenerateSeries { .. }),
        ) => {
            tracing::warn!(error = %e, "humidity vs flow correlation skipped");
        }
        Err(e) => return Err(e.into()),
    }

    for line in &digest.summary {
        tracing::info!(advice = %line, "recommendation");
    }
    tracing::info!(dir = %sink.dir().display(), "artifacts saved");

    Ok(())
}
