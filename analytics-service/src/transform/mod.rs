use time::{macros::datetime, OffsetDateTime, UtcOffset};
use water_client::{FlowSeries, QualitySeries};

use crate::error::AnalyticsError;

fn check_timestamp(ts: OffsetDateTime, site_offset: UtcOffset) -> Result<(), AnalyticsError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if ts < min_ts || ts > max_ts {
        return Err(AnalyticsError::InputShape(format!(
            "timestamp {ts} out of allowed range"
        )));
    }
    if ts.offset() != site_offset {
        return Err(AnalyticsError::InputShape(format!(
            "timestamp {ts} is not in the site offset {site_offset}"
        )));
    }
    Ok(())
}

/// Pure validation of a flow series against the site contract.
///
/// Rules:
/// - every timestamp within [2000-01-01, 2100-01-01].
/// - every timestamp in the configured site offset.
///
/// Ordering, finiteness and non-negative consumption are already enforced by
/// `FlowSeries` itself.
pub fn validate_flow(flow: &FlowSeries, site_offset: UtcOffset) -> Result<(), AnalyticsError> {
    for r in flow {
        if let Err(e) = check_timestamp(r.timestamp, site_offset) {
            metrics::counter!("validation_flow_rejected_total").increment(1);
            return Err(e);
        }
    }
    Ok(())
}

/// Pure validation of a quality series; same timestamp rules as flow.
pub fn validate_quality(
    quality: &QualitySeries,
    site_offset: UtcOffset,
) -> Result<(), AnalyticsError> {
    for r in quality {
        if let Err(e) = check_timestamp(r.timestamp, site_offset) {
            metrics::counter!("validation_quality_rejected_total").increment(1);
            return Err(e);
        }
    }
    Ok(())
}
