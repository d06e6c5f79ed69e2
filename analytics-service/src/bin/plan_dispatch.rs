use analytics_service::{
    config::AppConfig,
    dispatch::{dispatch, PlannedQuery},
    observability,
    server::QueryResponse,
    sources::{load_flow_csv, load_quality_csv},
    transform,
};
use anyhow::Result;
use std::{env, io::Read};

/// Dispatch one planner output against the configured site exports and
/// print the result as JSON.
///
/// Usage: `plan_dispatch [planner_text]`; reads stdin when no argument is
/// given. The text may be bare JSON or prose around a JSON object.
fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let offset = cfg.site.offset()?;
    let settings = cfg.dispatch_settings();

    let args: Vec<String> = env::args().skip(1).collect();
    let text = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        args.join(" ")
    };

    let plan = PlannedQuery::from_planner_text(&text, &settings.limits);

    let flow = load_flow_csv(&cfg.site.flow_path, offset)?;
    transform::validate_flow(&flow, offset)?;
    let quality = load_quality_csv(&cfg.site.quality_path, offset)?;
    transform::validate_quality(&quality, offset)?;

    let output = dispatch(&flow, &quality, &plan, &settings)?;
    let response = QueryResponse { plan, output };
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
