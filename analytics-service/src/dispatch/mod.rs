pub mod plan;

use std::borrow::Cow;

use serde::Serialize;
use time::Duration;
use water_client::{
    query::{flow_profile, quality_profile, trailing_window},
    FlowSeries, QualitySeries,
};

use crate::{
    analytics::{
        breach_events_with, daily_compliance, daily_totals, humidity_vs_flow, shift_aggregates,
        BreachEvent, BreachOptions, ComplianceRow, DailyAggregate, HumidityFlowReport,
        ShiftAggregate, Table, DEFAULT_HUMIDITY_PARAMETER,
    },
    error::AnalyticsError,
};

use plan::reject;
pub use plan::{Action, PlannedQuery, PlannerLimits, QueryParams};

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub limits: PlannerLimits,
    pub humidity_parameter: String,
    pub breach: BreachOptions,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            limits: PlannerLimits::default(),
            humidity_parameter: DEFAULT_HUMIDITY_PARAMETER.to_string(),
            breach: BreachOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "result", rename_all = "snake_case")]
pub enum QueryOutput {
    FlowShift(Table<ShiftAggregate>),
    FlowDaily(Table<DailyAggregate>),
    QualityCompliance(Table<ComplianceRow>),
    BreachEvents(Table<BreachEvent>),
    HumidityVsFlow(HumidityFlowReport),
    None,
}

impl QueryOutput {
    pub fn action(&self) -> Action {
        match self {
            QueryOutput::FlowShift(_) => Action::FlowShift,
            QueryOutput::FlowDaily(_) => Action::FlowDaily,
            QueryOutput::QualityCompliance(_) => Action::QualityCompliance,
            QueryOutput::BreachEvents(_) => Action::BreachEvents,
            QueryOutput::HumidityVsFlow(_) => Action::HumidityVsFlow,
            QueryOutput::None => Action::None,
        }
    }
}

/// Resolve a planner-supplied parameter name against the dataset: exact
/// match, then case-insensitive match, then a unique case-insensitive
/// substring match.
pub fn resolve_parameter<'q>(
    quality: &'q QualitySeries,
    requested: &str,
) -> Result<&'q str, AnalyticsError> {
    let known = quality.parameters();
    if let Some(p) = known.iter().copied().find(|p| *p == requested) {
        return Ok(p);
    }
    if let Some(p) = known.iter().copied().find(|p| p.eq_ignore_ascii_case(requested)) {
        return Ok(p);
    }

    let needle = requested.to_lowercase();
    let mut candidates = known.into_iter().filter(|p| p.to_lowercase().contains(&needle));
    match (candidates.next(), candidates.next()) {
        (Some(p), None) => Ok(p),
        _ => Err(AnalyticsError::UnknownParameter(requested.to_string())),
    }
}

fn windowed_flow(flow: &FlowSeries, range_days: Option<u32>) -> Cow<'_, FlowSeries> {
    match (range_days, flow.last_timestamp()) {
        (Some(days), Some(last)) => {
            let (start, end) = trailing_window(last, Duration::days(i64::from(days)));
            Cow::Owned(flow_profile(flow, start, end))
        }
        _ => Cow::Borrowed(flow),
    }
}

fn windowed_quality(quality: &QualitySeries, range_days: Option<u32>) -> Cow<'_, QualitySeries> {
    match (range_days, quality.last_timestamp()) {
        (Some(days), Some(last)) => {
            let (start, end) = trailing_window(last, Duration::days(i64::from(days)));
            Cow::Owned(quality_profile(quality, None, start, end))
        }
        _ => Cow::Borrowed(quality),
    }
}

/// Run one planned query against the loaded tables.
///
/// `range_days` keeps the trailing days ending at each table's latest
/// timestamp. `parameter` narrows the quality actions (compliance defaults to
/// the first parameter in sorted order); `min_duration_min` drops shorter
/// breach events. `humidity_vs_flow` always uses the configured humidity
/// parameter.
pub fn dispatch(
    flow: &FlowSeries,
    quality: &QualitySeries,
    plan: &PlannedQuery,
    settings: &DispatchSettings,
) -> Result<QueryOutput, AnalyticsError> {
    let action = plan.action.as_str();
    metrics::counter!("analytics_queries_total", "action" => action).increment(1);
    tracing::info!(
        action,
        parameter = plan.params.parameter.as_deref(),
        range_days = plan.params.range_days,
        min_duration_min = plan.params.min_duration_min,
        "dispatching planned query"
    );

    let days = plan.params.range_days;
    let requested = plan.params.parameter.as_deref();
    let resolve = || requested.map(|p| resolve_parameter(quality, p)).transpose();

    let output = match plan.action {
        Action::QualityCompliance => {
            let all = quality.parameters();
            let table = match resolve()?.or_else(|| all.first().copied()) {
                Some(target) => daily_compliance(&windowed_quality(quality, days))
                    .filter(|r| r.parameter == target),
                None => Table::empty(),
            };
            QueryOutput::QualityCompliance(table)
        }
        Action::BreachEvents => {
            let target = resolve()?;
            let mut table = breach_events_with(&windowed_quality(quality, days), &settings.breach);
            if let Some(target) = target {
                table = table.filter(|e| e.parameter == target);
            }
            if let Some(min) = plan.params.min_duration_min {
                table = table.filter(|e| e.duration_min >= min);
            }
            QueryOutput::BreachEvents(table)
        }
        other => {
            if let Some(p) = requested {
                reject("parameter", &format!("{p} (unused by {})", other.as_str()));
            }
            match other {
                Action::FlowShift => {
                    QueryOutput::FlowShift(shift_aggregates(&windowed_flow(flow, days)))
                }
                Action::FlowDaily => {
                    QueryOutput::FlowDaily(daily_totals(&windowed_flow(flow, days)))
                }
                Action::HumidityVsFlow => QueryOutput::HumidityVsFlow(humidity_vs_flow(
                    &windowed_flow(flow, days),
                    &windowed_quality(quality, days),
                    &settings.humidity_parameter,
                )?),
                _ => QueryOutput::None,
            }
        }
    };

    Ok(output)
}
