use std::collections::BTreeMap;

use serde::Serialize;
use time::Date;
use water_client::{FlowSeries, QualityReading, QualitySeries};

use super::aggregation::daily_totals;
use super::compliance::pct_in_range;
use super::stats::{group_values, mean, pearson, pearson_p_value};
use super::table::{Table, TableRow};
use crate::error::AnalyticsError;

/// Default identifier of the humidity parameter in site quality exports.
pub const DEFAULT_HUMIDITY_PARAMETER: &str = "HUMIDITY (HUMIDITY)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFlowRow {
    pub year: i32,
    pub month: u8,
    pub total_consumption: f64,
    pub count: usize,
}

impl TableRow for MonthlyFlowRow {
    const COLUMNS: &'static [&'static str] = &["year", "month", "total_consumption", "count"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyQualityRow {
    pub parameter: String,
    pub year: i32,
    pub month: u8,
    pub pct_in_range: f64,
    pub reading_count: usize,
}

impl TableRow for MonthlyQualityRow {
    const COLUMNS: &'static [&'static str] =
        &["parameter", "year", "month", "pct_in_range", "reading_count"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRollups {
    pub flow: Table<MonthlyFlowRow>,
    pub quality: Table<MonthlyQualityRow>,
}

fn month_key(date: Date) -> (i32, u8) {
    (date.year(), u8::from(date.month()))
}

pub fn monthly_rollups(flow: &FlowSeries, quality: &QualitySeries) -> MonthlyRollups {
    let flow_rows = group_values(flow.consumption().map(|(ts, c)| (month_key(ts.date()), c)))
        .into_iter()
        .map(|((year, month), values)| MonthlyFlowRow {
            year,
            month,
            total_consumption: values.iter().sum(),
            count: values.len(),
        })
        .collect();

    let mut quality_rows = Vec::new();
    for (parameter, readings) in quality.by_parameter() {
        let mut months: BTreeMap<(i32, u8), Vec<&QualityReading>> = BTreeMap::new();
        for r in readings {
            months.entry(month_key(r.timestamp.date())).or_default().push(r);
        }
        for ((year, month), group) in months {
            if let Some(pct) = pct_in_range(group.iter().copied()) {
                quality_rows.push(MonthlyQualityRow {
                    parameter: parameter.to_string(),
                    year,
                    month,
                    pct_in_range: pct,
                    reading_count: group.len(),
                });
            }
        }
    }

    MonthlyRollups {
        flow: Table::new(flow_rows),
        quality: Table::new(quality_rows),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumidityFlowRow {
    pub date: Date,
    pub total_consumption: f64,
    pub humidity: f64,
}

impl TableRow for HumidityFlowRow {
    const COLUMNS: &'static [&'static str] = &["date", "total_consumption", "humidity"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumidityFlowReport {
    pub humidity_parameter: String,
    pub rows: Table<HumidityFlowRow>,
    pub correlation: f64,
    pub p_value: Option<f64>,
}

/// Daily total consumption joined with daily mean humidity, and their Pearson
/// correlation.
///
/// Only dates present on both sides are kept. Fewer than two joined days is
/// `InsufficientData`; a constant side is `DegenerateSeries`.
pub fn humidity_vs_flow(
    flow: &FlowSeries,
    quality: &QualitySeries,
    humidity_parameter_name: &str,
) -> Result<HumidityFlowReport, AnalyticsError> {
    let daily_humidity: BTreeMap<Date, f64> = group_values(
        quality
            .for_parameter(humidity_parameter_name)
            .iter()
            .map(|r| (r.timestamp.date(), r.value)),
    )
    .into_iter()
    .filter_map(|(date, values)| mean(&values).map(|m| (date, m)))
    .collect();

    let rows: Vec<HumidityFlowRow> = daily_totals(flow)
        .into_rows()
        .into_iter()
        .filter_map(|d| {
            daily_humidity.get(&d.date).map(|h| HumidityFlowRow {
                date: d.date,
                total_consumption: d.total_consumption,
                humidity: *h,
            })
        })
        .collect();

    if rows.len() < 2 {
        return Err(AnalyticsError::InsufficientData {
            statistic: "humidity vs flow correlation",
            required: 2,
            got: rows.len(),
        });
    }

    let consumption: Vec<f64> = rows.iter().map(|r| r.total_consumption).collect();
    let humidity: Vec<f64> = rows.iter().map(|r| r.humidity).collect();
    let correlation =
        pearson(&consumption, &humidity).ok_or_else(|| AnalyticsError::DegenerateSeries {
            statistic: "humidity vs flow correlation",
            reason: "daily consumption or humidity is constant".to_string(),
        })?;
    let p_value = pearson_p_value(correlation, rows.len());

    tracing::debug!(days = rows.len(), correlation, "humidity correlation computed");

    Ok(HumidityFlowReport {
        humidity_parameter: humidity_parameter_name.to_string(),
        rows: Table::new(rows),
        correlation,
        p_value,
    })
}
