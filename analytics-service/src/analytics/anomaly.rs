use std::collections::VecDeque;

use serde::Serialize;
use time::OffsetDateTime;
use water_client::FlowSeries;

use super::stats::median_sorted;
use super::table::{Table, TableRow};

/// Normal consistency constant for the median absolute deviation.
pub const MAD_CONSISTENCY: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyOptions {
    /// Trailing window length in readings (24 five-minute readings is two hours).
    pub window: usize,
    /// Robust z-score cut-off applied to the consistency-scaled MAD.
    pub k: f64,
}

impl Default for AnomalyOptions {
    fn default() -> Self {
        Self { window: 24, k: 3.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFlag {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub consumption: Option<f64>,
    pub rolling_median: Option<f64>,
    pub rolling_mad: Option<f64>,
    pub robust_z: Option<f64>,
    pub is_anomaly: bool,
}

impl TableRow for AnomalyFlag {
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "consumption",
        "rolling_median",
        "rolling_mad",
        "robust_z",
        "is_anomaly",
    ];
}

/// Fixed-capacity window keeping its values in arrival order and in sorted
/// order, so the median is an index lookup.
struct RollingWindow {
    capacity: usize,
    arrivals: VecDeque<Option<f64>>,
    sorted: Vec<f64>,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            arrivals: VecDeque::with_capacity(capacity + 1),
            sorted: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: Option<f64>) {
        self.arrivals.push_back(value);
        if let Some(v) = value {
            let at = self.sorted.partition_point(|x| x.total_cmp(&v).is_lt());
            self.sorted.insert(at, v);
        }

        if self.arrivals.len() > self.capacity {
            if let Some(Some(old)) = self.arrivals.pop_front() {
                let at = self.sorted.partition_point(|x| x.total_cmp(&old).is_lt());
                if at < self.sorted.len() {
                    self.sorted.remove(at);
                }
            }
        }
    }

    /// Median and MAD over the defined values currently in the window.
    fn median_and_mad(&self) -> Option<(f64, f64)> {
        let median = median_sorted(&self.sorted)?;
        let mut deviations: Vec<f64> = self.sorted.iter().map(|v| (v - median).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        let mad = median_sorted(&deviations)?;
        Some((median, mad))
    }
}

fn classify(consumption: f64, median: f64, mad: f64, k: f64) -> (bool, Option<f64>) {
    if mad == 0.0 {
        return (consumption != median, None);
    }
    let z = (consumption - median).abs() / (MAD_CONSISTENCY * mad);
    (z > k, Some(z))
}

/// Flag consumption spikes with the default window (24) and `k` (3.0).
pub fn flow_anomalies(flow: &FlowSeries) -> Table<AnomalyFlag> {
    flow_anomalies_with(flow, &AnomalyOptions::default())
}

/// One row per reading. The trailing window for reading `i` holds the
/// `window` readings ending at `i`; once `i >= window` a reading is flagged
/// when `|consumption - median| > k * 1.4826 * MAD`, or, with a zero MAD,
/// when it differs from the median. Earlier readings are never flagged and
/// carry no rolling statistics.
pub fn flow_anomalies_with(flow: &FlowSeries, options: &AnomalyOptions) -> Table<AnomalyFlag> {
    let window = options.window.max(1);
    let mut rolling = RollingWindow::new(window);
    let mut rows = Vec::with_capacity(flow.len());

    for (i, reading) in flow.iter().enumerate() {
        rolling.push(reading.consumption);

        let stats = if i >= window {
            reading
                .consumption
                .and_then(|c| rolling.median_and_mad().map(|(m, mad)| (c, m, mad)))
        } else {
            None
        };

        let row = match stats {
            Some((c, median, mad)) => {
                let (is_anomaly, robust_z) = classify(c, median, mad, options.k);
                AnomalyFlag {
                    timestamp: reading.timestamp,
                    consumption: Some(c),
                    rolling_median: Some(median),
                    rolling_mad: Some(mad),
                    robust_z,
                    is_anomaly,
                }
            }
            None => AnomalyFlag {
                timestamp: reading.timestamp,
                consumption: reading.consumption,
                rolling_median: None,
                rolling_mad: None,
                robust_z: None,
                is_anomaly: false,
            },
        };
        rows.push(row);
    }

    let flagged = rows.iter().filter(|r| r.is_anomaly).count();
    tracing::debug!(rows = rows.len(), flagged, window, k = options.k, "flow anomalies scored");
    Table::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::stats::{median, median_absolute_deviation};
    use time::macros::datetime;
    use time::Duration;

    fn flow_from_increments(increments: &[f64]) -> FlowSeries {
        let start = datetime!(2024-03-01 00:00:00 +05:30);
        let mut total = 1_000.0;
        let mut samples = vec![(start, total)];
        for (i, inc) in increments.iter().enumerate() {
            total += inc;
            samples.push((start + Duration::minutes(5 * (i as i64 + 1)), total));
        }
        FlowSeries::from_totalizer(samples).unwrap()
    }

    fn noisy_baseline(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + (i % 5) as f64 * 0.5).collect()
    }

    #[test]
    fn readings_before_window_are_unflagged_without_stats() {
        let mut inc = noisy_baseline(10);
        inc[2] = 500.0;
        let flow = flow_from_increments(&inc);
        let flags = flow_anomalies_with(&flow, &AnomalyOptions { window: 6, k: 3.0 });

        assert_eq!(flags.len(), flow.len());
        for row in flags.iter().take(6) {
            assert!(!row.is_anomaly);
            assert_eq!(row.rolling_median, None);
            assert_eq!(row.rolling_mad, None);
        }
        assert!(flags.rows()[6].rolling_median.is_some());
        assert_eq!(flags.rows()[0].consumption, None);
    }

    #[test]
    fn spike_is_flagged_after_window_fills() {
        let mut inc = noisy_baseline(40);
        inc[30] = 80.0;
        let flow = flow_from_increments(&inc);
        let flags = flow_anomalies(&flow);

        // increments[30] is reading 31 (reading 0 has no consumption).
        let spike = &flags.rows()[31];
        assert_eq!(spike.consumption, Some(80.0));
        assert!(spike.is_anomaly);
        assert!(spike.robust_z.unwrap() > 3.0);

        let flagged = flags.iter().filter(|r| r.is_anomaly).count();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn rolling_stats_match_a_direct_recomputation() {
        let inc: Vec<f64> = (0..30).map(|i| ((i * 7) % 11) as f64).collect();
        let flow = flow_from_increments(&inc);
        let window = 8;
        let flags = flow_anomalies_with(&flow, &AnomalyOptions { window, k: 3.0 });

        let consumption: Vec<Option<f64>> = flow.iter().map(|r| r.consumption).collect();
        for i in window..consumption.len() {
            let values: Vec<f64> =
                consumption[i + 1 - window..=i].iter().flatten().copied().collect();
            let m = median(&values).unwrap();
            let mad = median_absolute_deviation(&values, m).unwrap();
            assert_eq!(flags.rows()[i].rolling_median, Some(m), "median at {i}");
            assert_eq!(flags.rows()[i].rolling_mad, Some(mad), "mad at {i}");
        }
    }

    #[test]
    fn zero_mad_flags_any_deviation_from_median() {
        let mut inc = vec![5.0; 12];
        inc[10] = 5.5;
        let flow = flow_from_increments(&inc);
        let flags = flow_anomalies_with(&flow, &AnomalyOptions { window: 4, k: 3.0 });

        let row = &flags.rows()[11];
        assert_eq!(row.rolling_median, Some(5.0));
        assert_eq!(row.rolling_mad, Some(0.0));
        assert_eq!(row.robust_z, None);
        assert!(row.is_anomaly);

        let steady = &flags.rows()[9];
        assert_eq!(steady.rolling_mad, Some(0.0));
        assert!(!steady.is_anomaly);
    }

    #[test]
    fn rerun_is_bit_identical() {
        let mut inc = noisy_baseline(60);
        inc[25] = 40.0;
        inc[44] = 0.0;
        let flow = flow_from_increments(&inc);
        let a = flow_anomalies(&flow);
        let b = flow_anomalies(&flow);
        assert_eq!(a, b);
        let bits = |t: &Table<AnomalyFlag>| -> Vec<Option<u64>> {
            t.iter().map(|r| r.robust_z.map(f64::to_bits)).collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn empty_flow_has_no_flags() {
        assert!(flow_anomalies(&FlowSeries::default()).is_empty());
    }
}
