use time::{Date, Duration, OffsetDateTime};

use crate::domain::{FlowSeries, QualitySeries};

/// The `[last - span, last]` window ending at a dataset's latest timestamp.
///
/// A span reaching past the earliest representable date starts there.
pub fn trailing_window(last: OffsetDateTime, span: Duration) -> (OffsetDateTime, OffsetDateTime) {
    let start = last
        .checked_sub(span)
        .unwrap_or_else(|| Date::MIN.midnight().assume_offset(last.offset()));
    (start, last)
}

/// Fetch the time-ordered flow profile between `start` and `end`, inclusive.
///
/// Consumption keeps the values derived against the full series, so the
/// first reading of the profile still carries its interval delta.
pub fn flow_profile(series: &FlowSeries, start: OffsetDateTime, end: OffsetDateTime) -> FlowSeries {
    let readings = series.readings();
    let lo = readings.partition_point(|r| r.timestamp < start);
    let hi = readings.partition_point(|r| r.timestamp <= end);
    if lo >= hi {
        return FlowSeries::default();
    }
    FlowSeries::from_sorted_unchecked(readings[lo..hi].to_vec())
}

/// Quality readings between `start` and `end` inclusive, optionally narrowed
/// to one parameter.
pub fn quality_profile(
    series: &QualitySeries,
    parameter: Option<&str>,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> QualitySeries {
    let source = match parameter {
        Some(p) => series.for_parameter(p),
        None => series.readings(),
    };

    let rows = source
        .iter()
        .filter(|r| r.timestamp >= start && r.timestamp <= end)
        .cloned()
        .collect();

    QualitySeries::from_sorted_unchecked(rows)
}
