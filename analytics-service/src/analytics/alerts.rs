use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use water_client::{query::trailing_window, QualitySeries};

use super::table::{Table, TableRow};
use crate::error::AnalyticsError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestBreach {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub parameter: String,
    pub value: f64,
    pub safe_min: f64,
    pub safe_max: f64,
}

impl TableRow for LatestBreach {
    const COLUMNS: &'static [&'static str] =
        &["timestamp", "parameter", "value", "safe_min", "safe_max"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestBreaches {
    #[serde(with = "time::serde::rfc3339::option")]
    pub window_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub window_end: Option<OffsetDateTime>,
    pub rows: Table<LatestBreach>,
}

impl LatestBreaches {
    /// Rows grouped by parameter, each group time-ordered.
    pub fn by_parameter(&self) -> BTreeMap<&str, Vec<&LatestBreach>> {
        let mut groups: BTreeMap<&str, Vec<&LatestBreach>> = BTreeMap::new();
        for row in self.rows.iter() {
            groups.entry(row.parameter.as_str()).or_default().push(row);
        }
        groups
    }

    pub fn parameters(&self) -> Vec<&str> {
        self.by_parameter().into_keys().collect()
    }
}

/// Out-of-range readings in `[now - lookback, now]`, where `now` is the
/// latest timestamp present in the dataset rather than the wall clock.
pub fn quality_latest_breaches(quality: &QualitySeries, lookback: Duration) -> LatestBreaches {
    let Some(now) = quality.last_timestamp() else {
        return LatestBreaches {
            window_start: None,
            window_end: None,
            rows: Table::empty(),
        };
    };
    let (start, end) = trailing_window(now, lookback);

    let rows: Vec<LatestBreach> = quality
        .iter()
        .filter(|r| r.timestamp >= start && r.timestamp <= end && !r.in_range())
        .map(|r| LatestBreach {
            timestamp: r.timestamp,
            parameter: r.parameter.clone(),
            value: r.value,
            safe_min: r.safe_min,
            safe_max: r.safe_max,
        })
        .collect();

    tracing::debug!(rows = rows.len(), %start, %end, "latest breaches selected");
    LatestBreaches {
        window_start: Some(start),
        window_end: Some(end),
        rows: Table::new(rows),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub parameter: String,
    pub action_text: String,
}

impl TableRow for Recommendation {
    const COLUMNS: &'static [&'static str] = &["parameter", "action_text"];
}

pub const GENERIC_ADVISORY: &str =
    "Parameter outside safe range → verify sensor calibration and review recent process changes.";

struct AdvisoryRule {
    /// Case-insensitive whole-identifier matches.
    exact: &'static [&'static str],
    /// Case-sensitive fragments of the identifier.
    fragments: &'static [&'static str],
    advice: &'static str,
}

impl AdvisoryRule {
    fn matches(&self, parameter: &str) -> bool {
        let trimmed = parameter.trim();
        self.exact.iter().any(|e| trimmed.eq_ignore_ascii_case(e))
            || self.fragments.iter().any(|f| trimmed.contains(f))
    }
}

const ADVISORY_RULES: &[AdvisoryRule] = &[
    AdvisoryRule {
        exact: &["tds"],
        fragments: &["TDS"],
        advice: "High TDS detected → check RO/softener status, resin condition, and source blend.",
    },
    AdvisoryRule {
        exact: &["ph"],
        fragments: &["(pH", "pH)"],
        advice: "pH out of range → verify dosing pumps (alkali/acid), \
                 electrode calibration, and tank mixing.",
    },
    AdvisoryRule {
        exact: &["turbidity", "tss"],
        fragments: &["TSS", "Turb", "TURB", "turb"],
        advice: "Suspended solids/turbidity ↑ → inspect filters/backwash cycles \
                 and upstream settling.",
    },
    AdvisoryRule {
        exact: &["bod", "cod"],
        fragments: &["BOD", "COD"],
        advice: "BOD/COD breaches → check biological treatment load, aeration, and recycle ratios.",
    },
    AdvisoryRule {
        exact: &["humidity"],
        fragments: &["HUMIDITY", "Humidity"],
        advice: "Humidity spikes → consider ventilation/conditioning; correlate with usage peaks.",
    },
];

/// Advisory text for one breached parameter; the first matching rule wins.
pub fn advisory_for(parameter: &str) -> Result<&'static str, AnalyticsError> {
    ADVISORY_RULES
        .iter()
        .find(|rule| rule.matches(parameter))
        .map(|rule| rule.advice)
        .ok_or_else(|| AnalyticsError::UnknownParameter(parameter.to_string()))
}

/// One recommendation per distinct breached parameter, in sorted order.
///
/// Parameters without a rule receive [`GENERIC_ADVISORY`].
pub fn simple_recommendations<'a, I>(breach_parameters: I) -> Table<Recommendation>
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: BTreeSet<&str> = breach_parameters.into_iter().collect();

    let rows = distinct
        .into_iter()
        .map(|parameter| {
            let action_text = match advisory_for(parameter) {
                Ok(advice) => advice,
                Err(e) => {
                    tracing::debug!(error = %e, "no advisory rule, using generic advisory");
                    GENERIC_ADVISORY
                }
            };
            Recommendation {
                parameter: parameter.to_string(),
                action_text: action_text.to_string(),
            }
        })
        .collect();

    Table::new(rows)
}

/// Deduplicated advisory lines for display, or an all-clear line when
/// nothing breached within the lookback.
pub fn recommendation_summary(
    recommendations: &Table<Recommendation>,
    lookback: Duration,
) -> Vec<String> {
    if recommendations.is_empty() {
        return vec![format!(
            "All parameters within safe ranges in the last {}h.",
            lookback.whole_hours()
        )];
    }

    let mut seen = BTreeSet::new();
    recommendations
        .iter()
        .filter(|r| seen.insert(r.action_text.as_str()))
        .map(|r| r.action_text.clone())
        .collect()
}

/// Latest breaches together with the advisories they trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDigest {
    pub breaches: LatestBreaches,
    pub recommendations: Table<Recommendation>,
    pub summary: Vec<String>,
}

pub fn alert_digest(quality: &QualitySeries, lookback: Duration) -> AlertDigest {
    let breaches = quality_latest_breaches(quality, lookback);
    let recommendations = simple_recommendations(breaches.parameters());
    let summary = recommendation_summary(&recommendations, lookback);
    AlertDigest {
        breaches,
        recommendations,
        summary,
    }
}
