use std::collections::BTreeMap;

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};
use water_client::{QualityReading, QualitySeries};

use super::stats::{mean, median, min_max};
use super::table::{Table, TableRow};

/// Percentage of readings inside the safe range, `None` for no readings.
pub fn pct_in_range<'a, I>(readings: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a QualityReading>,
{
    let (inside, total) = readings
        .into_iter()
        .fold((0usize, 0usize), |(inside, total), r| {
            (inside + usize::from(r.in_range()), total + 1)
        });
    if total == 0 {
        return None;
    }
    Some(100.0 * inside as f64 / total as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceRow {
    pub parameter: String,
    pub date: Date,
    pub pct_in_range: f64,
    pub breaches: usize,
    pub reading_count: usize,
    pub value_min: f64,
    pub value_max: f64,
    pub value_mean: f64,
}

impl TableRow for ComplianceRow {
    const COLUMNS: &'static [&'static str] = &[
        "parameter",
        "date",
        "pct_in_range",
        "breaches",
        "reading_count",
        "value_min",
        "value_max",
        "value_mean",
    ];
}

/// Per `(parameter, date)` in-range percentage and value statistics.
pub fn daily_compliance(quality: &QualitySeries) -> Table<ComplianceRow> {
    let mut rows = Vec::new();

    for (parameter, readings) in quality.by_parameter() {
        let mut days: BTreeMap<Date, Vec<&QualityReading>> = BTreeMap::new();
        for r in readings {
            days.entry(r.timestamp.date()).or_default().push(r);
        }

        for (date, day) in days {
            let Some(pct) = pct_in_range(day.iter().copied()) else {
                continue;
            };
            let values: Vec<f64> = day.iter().map(|r| r.value).collect();
            let (Some((lo, hi)), Some(avg)) = (min_max(&values), mean(&values)) else {
                continue;
            };
            rows.push(ComplianceRow {
                parameter: parameter.to_string(),
                date,
                pct_in_range: pct,
                breaches: day.iter().filter(|r| !r.in_range()).count(),
                reading_count: day.len(),
                value_min: lo,
                value_max: hi,
                value_mean: avg,
            });
        }
    }

    tracing::debug!(rows = rows.len(), "daily compliance computed");
    Table::new(rows)
}

/// A maximal run of consecutive out-of-range readings for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreachEvent {
    pub parameter: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
    pub duration_min: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl BreachEvent {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

impl TableRow for BreachEvent {
    const COLUMNS: &'static [&'static str] = &[
        "parameter",
        "start",
        "end",
        "duration_min",
        "min_value",
        "max_value",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreachOptions {
    /// A run is split when consecutive readings are further apart than
    /// `gap_factor` times the parameter's median sampling interval.
    /// Values below 1.0 are treated as 1.0.
    pub gap_factor: f64,
}

impl Default for BreachOptions {
    fn default() -> Self {
        Self { gap_factor: 2.0 }
    }
}

struct OpenRun {
    start: OffsetDateTime,
    end: OffsetDateTime,
    min: f64,
    max: f64,
}

impl OpenRun {
    fn open(r: &QualityReading) -> Self {
        Self {
            start: r.timestamp,
            end: r.timestamp,
            min: r.value,
            max: r.value,
        }
    }

    fn extend(&mut self, r: &QualityReading) {
        self.end = r.timestamp;
        self.min = self.min.min(r.value);
        self.max = self.max.max(r.value);
    }

    fn close(self, parameter: &str) -> BreachEvent {
        BreachEvent {
            parameter: parameter.to_string(),
            start: self.start,
            end: self.end,
            duration_min: (self.end - self.start).as_seconds_f64() / 60.0,
            min_value: self.min,
            max_value: self.max,
        }
    }
}

enum RunState {
    OutsideRun,
    InsideRun(OpenRun),
}

/// Largest gap between consecutive readings that still counts as contiguous.
///
/// `None` (no gap splitting) when the parameter has no cadence or the scaled
/// tolerance is not a representable duration.
fn cadence_tolerance(readings: &[QualityReading], gap_factor: f64) -> Option<Duration> {
    let intervals: Vec<f64> = readings
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).as_seconds_f64())
        .filter(|s| *s > 0.0)
        .collect();
    let cadence = median(&intervals)?;
    Duration::checked_seconds_f64(cadence * gap_factor.max(1.0))
}

fn segment_parameter(
    parameter: &str,
    readings: &[QualityReading],
    options: &BreachOptions,
    out: &mut Vec<BreachEvent>,
) {
    let tolerance = cadence_tolerance(readings, options.gap_factor);
    let mut state = RunState::OutsideRun;
    let mut previous: Option<OffsetDateTime> = None;

    for r in readings {
        if let (Some(prev), Some(tol)) = (previous, tolerance) {
            if r.timestamp - prev > tol {
                let closed = std::mem::replace(&mut state, RunState::OutsideRun);
                if let RunState::InsideRun(run) = closed {
                    out.push(run.close(parameter));
                }
            }
        }
        previous = Some(r.timestamp);

        state = match (state, r.in_range()) {
            (RunState::OutsideRun, true) => RunState::OutsideRun,
            (RunState::OutsideRun, false) => RunState::InsideRun(OpenRun::open(r)),
            (RunState::InsideRun(mut run), false) => {
                run.extend(r);
                RunState::InsideRun(run)
            }
            (RunState::InsideRun(run), true) => {
                out.push(run.close(parameter));
                RunState::OutsideRun
            }
        };
    }

    if let RunState::InsideRun(run) = state {
        out.push(run.close(parameter));
    }
}

/// Breach events with the default cadence-gap tolerance.
pub fn breach_events(quality: &QualitySeries) -> Table<BreachEvent> {
    breach_events_with(quality, &BreachOptions::default())
}

/// Consecutive out-of-range segments per parameter, ordered by
/// `(parameter, start)`. Parameters never merge into each other's runs.
pub fn breach_events_with(quality: &QualitySeries, options: &BreachOptions) -> Table<BreachEvent> {
    let mut events = Vec::new();
    for (parameter, readings) in quality.by_parameter() {
        segment_parameter(parameter, readings, options, &mut events);
    }

    tracing::debug!(events = events.len(), "breach events segmented");
    Table::new(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn base() -> OffsetDateTime {
        datetime!(2024-03-01 10:00:00 +05:30)
    }

    fn ph(values: &[(i64, f64)]) -> Vec<QualityReading> {
        values
            .iter()
            .map(|(m, v)| QualityReading {
                timestamp: base() + Duration::minutes(*m),
                parameter: "pH".to_string(),
                value: *v,
                safe_min: 6.5,
                safe_max: 8.5,
            })
            .collect()
    }

    fn series(readings: Vec<QualityReading>) -> QualitySeries {
        QualitySeries::from_readings(readings).unwrap()
    }

    #[test]
    fn ph_run_covers_first_two_readings() {
        let q = series(ph(&[(0, 8.6), (5, 8.7), (10, 8.4)]));
        let events = breach_events(&q);

        assert_eq!(events.len(), 1);
        let e = &events.rows()[0];
        assert_eq!(e.parameter, "pH");
        assert_eq!(e.start, base());
        assert_eq!(e.end, base() + Duration::minutes(5));
        assert_eq!(e.duration(), Duration::minutes(5));
        assert_eq!(e.duration_min, 5.0);
        assert_eq!(e.max_value, 8.7);
        assert_eq!(e.min_value, 8.6);
    }

    #[test]
    fn isolated_breach_is_a_zero_duration_event() {
        let q = series(ph(&[(0, 7.0), (5, 9.0), (10, 7.0)]));
        let events = breach_events(&q);
        assert_eq!(events.len(), 1);
        let e = &events.rows()[0];
        assert_eq!(e.start, e.end);
        assert_eq!(e.duration_min, 0.0);
    }

    #[test]
    fn open_run_is_closed_at_end_of_series() {
        let q = series(ph(&[(0, 7.0), (5, 5.0), (10, 4.0)]));
        let events = breach_events(&q);
        assert_eq!(events.len(), 1);
        assert_eq!(events.rows()[0].end, base() + Duration::minutes(10));
        assert_eq!(events.rows()[0].min_value, 4.0);
    }

    #[test]
    fn no_breaches_returns_empty_table_with_schema() {
        let q = series(ph(&[(0, 7.0), (5, 7.5)]));
        let events = breach_events(&q);
        assert!(events.is_empty());
        assert_eq!(
            events.columns(),
            &["parameter", "start", "end", "duration_min", "min_value", "max_value"]
        );

        let empty = breach_events(&QualitySeries::default());
        assert!(empty.is_empty());
        assert_eq!(empty.columns().len(), 6);
    }

    #[test]
    fn cadence_gap_splits_a_run() {
        // 5-minute cadence, then a 60-minute hole while still out of range.
        let q = series(ph(&[(0, 9.0), (5, 9.1), (10, 7.0), (15, 9.2), (75, 9.3), (80, 9.4)]));
        let events = breach_events(&q);
        assert_eq!(events.len(), 3);
        assert_eq!(events.rows()[1].start, base() + Duration::minutes(15));
        assert_eq!(events.rows()[1].end, base() + Duration::minutes(15));
        assert_eq!(events.rows()[2].start, base() + Duration::minutes(75));
    }

    #[test]
    fn unrepresentable_gap_tolerance_disables_splitting() {
        let q = series(ph(&[(0, 9.0), (5, 9.1), (10, 9.0), (70, 9.2)]));
        assert_eq!(breach_events(&q).len(), 2);

        for gap_factor in [f64::INFINITY, f64::MAX] {
            let events = breach_events_with(&q, &BreachOptions { gap_factor });
            assert_eq!(events.len(), 1, "gap_factor {gap_factor}");
            assert_eq!(events.rows()[0].end, base() + Duration::minutes(70));
        }
    }

    #[test]
    fn parameters_are_segmented_independently() {
        let mut readings = ph(&[(0, 9.0), (5, 9.0)]);
        readings.extend([0i64, 5].iter().map(|m| QualityReading {
            timestamp: base() + Duration::minutes(*m),
            parameter: "TDS".to_string(),
            value: 900.0,
            safe_min: 0.0,
            safe_max: 500.0,
        }));
        let events = breach_events(&series(readings));
        assert_eq!(events.len(), 2);
        let params: Vec<&str> = events.iter().map(|e| e.parameter.as_str()).collect();
        assert_eq!(params, vec!["TDS", "pH"]);
    }

    #[test]
    fn events_cover_exactly_the_out_of_range_timestamps() {
        let values = [7.0, 9.0, 9.5, 7.0, 6.0, 6.1, 7.2, 8.6, 7.0, 9.9];
        let readings = ph(&values
            .iter()
            .enumerate()
            .map(|(i, v)| (5 * i as i64, *v))
            .collect::<Vec<_>>());
        let q = series(readings.clone());
        let events = breach_events(&q);

        for r in &readings {
            let covering = events.iter().filter(|e| e.contains(r.timestamp)).count();
            if r.in_range() {
                assert_eq!(covering, 0, "in-range reading covered at {}", r.timestamp);
            } else {
                assert_eq!(covering, 1, "out-of-range reading not covered once at {}", r.timestamp);
            }
        }

        // Maximality: the readings adjacent to each event are in range.
        for e in events.iter() {
            let idx_start = readings.iter().position(|r| r.timestamp == e.start).unwrap();
            let idx_end = readings.iter().position(|r| r.timestamp == e.end).unwrap();
            if idx_start > 0 {
                assert!(readings[idx_start - 1].in_range());
            }
            if idx_end + 1 < readings.len() {
                assert!(readings[idx_end + 1].in_range());
            }
        }
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn compliance_percentage_and_stats_per_day() {
        let q = series(ph(&[(0, 7.0), (5, 9.0), (10, 8.0), (15, 6.0)]));
        let rows = daily_compliance(&q);
        assert_eq!(rows.len(), 1);
        let row = &rows.rows()[0];
        assert_eq!(row.date, date!(2024 - 03 - 01));
        assert_eq!(row.pct_in_range, 50.0);
        assert_eq!(row.breaches, 2);
        assert_eq!(row.reading_count, 4);
        assert_eq!(row.value_min, 6.0);
        assert_eq!(row.value_max, 9.0);
        assert_eq!(row.value_mean, 7.5);
    }

    #[test]
    fn compliance_bounds_hold_across_days() {
        let readings: Vec<QualityReading> = (0..96)
            .map(|i| QualityReading {
                timestamp: base() + Duration::hours(i),
                parameter: "pH".to_string(),
                value: if i % 3 == 0 { 9.0 } else { 7.0 },
                safe_min: 6.5,
                safe_max: 8.5,
            })
            .collect();
        let rows = daily_compliance(&series(readings));
        assert_eq!(rows.len(), 5);
        for row in rows.iter() {
            assert!((0.0..=100.0).contains(&row.pct_in_range));
        }
    }

    #[test]
    fn empty_quality_has_no_compliance_rows() {
        assert!(daily_compliance(&QualitySeries::default()).is_empty());
        assert_eq!(pct_in_range(std::iter::empty::<&QualityReading>()), None);
    }
}
