use time::{OffsetDateTime, UtcOffset};

use crate::error::SeriesError;

/// One totalizer sample from the site flow meter.
///
/// `consumption` is the interval delta against the previous reading of the
/// series, clamped at zero across counter resets. The first reading of a
/// series has no previous sample, so its consumption is `None`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowReading {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub totalizer: f64,
    pub consumption: Option<f64>,
}

/// Interval consumption between two totalizer samples.
///
/// A decreasing counter (meter reset or rollover) yields zero.
pub fn interval_consumption(previous: f64, current: f64) -> f64 {
    (current - previous).max(0.0)
}

/// Time-ordered flow readings sharing one utc offset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowSeries {
    readings: Vec<FlowReading>,
}

impl FlowSeries {
    /// Build a series from raw `(timestamp, totalizer)` samples.
    ///
    /// Samples are sorted by timestamp, duplicate timestamps keep the first
    /// sample seen, and consumption is derived from consecutive samples.
    pub fn from_totalizer<I>(samples: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (OffsetDateTime, f64)>,
    {
        let mut samples: Vec<(OffsetDateTime, f64)> = samples.into_iter().collect();
        if let Some((ts, _)) = samples.iter().find(|(_, t)| !t.is_finite()) {
            return Err(SeriesError::NonFinite {
                field: "totalizer",
                ts: *ts,
            });
        }

        samples.sort_by_key(|(ts, _)| *ts);
        samples.dedup_by_key(|(ts, _)| *ts);

        let mut readings = Vec::with_capacity(samples.len());
        let mut previous: Option<f64> = None;
        for (timestamp, totalizer) in samples {
            let consumption = previous.map(|p| interval_consumption(p, totalizer));
            readings.push(FlowReading {
                timestamp,
                totalizer,
                consumption,
            });
            previous = Some(totalizer);
        }

        Self::from_readings(readings)
    }

    /// Wrap readings that already carry consumption, checking the table contract.
    pub fn from_readings(readings: Vec<FlowReading>) -> Result<Self, SeriesError> {
        let expected = readings.first().map(|r| r.timestamp.offset());

        for (index, r) in readings.iter().enumerate() {
            if let Some(expected) = expected {
                if r.timestamp.offset() != expected {
                    return Err(SeriesError::MixedOffsets {
                        expected,
                        found: r.timestamp.offset(),
                    });
                }
            }
            if !r.totalizer.is_finite() {
                return Err(SeriesError::NonFinite {
                    field: "totalizer",
                    ts: r.timestamp,
                });
            }
            if let Some(c) = r.consumption {
                if !c.is_finite() {
                    return Err(SeriesError::NonFinite {
                        field: "consumption",
                        ts: r.timestamp,
                    });
                }
                if c < 0.0 {
                    return Err(SeriesError::NegativeConsumption {
                        value: c,
                        ts: r.timestamp,
                    });
                }
            }
            if index > 0 {
                let prev = readings[index - 1].timestamp;
                if r.timestamp == prev {
                    return Err(SeriesError::DuplicateTimestamp { ts: r.timestamp });
                }
                if r.timestamp < prev {
                    return Err(SeriesError::Unsorted { index });
                }
            }
        }

        Ok(Self { readings })
    }

    pub(crate) fn from_sorted_unchecked(readings: Vec<FlowReading>) -> Self {
        Self { readings }
    }

    pub fn readings(&self) -> &[FlowReading] {
        &self.readings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlowReading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// The site offset shared by every reading, if any reading exists.
    pub fn offset(&self) -> Option<UtcOffset> {
        self.readings.first().map(|r| r.timestamp.offset())
    }

    pub fn first_timestamp(&self) -> Option<OffsetDateTime> {
        self.readings.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<OffsetDateTime> {
        self.readings.last().map(|r| r.timestamp)
    }

    /// Readings with a defined consumption, as `(timestamp, consumption)`.
    pub fn consumption(&self) -> impl Iterator<Item = (OffsetDateTime, f64)> + '_ {
        self.readings
            .iter()
            .filter_map(|r| r.consumption.map(|c| (r.timestamp, c)))
    }
}

impl<'a> IntoIterator for &'a FlowSeries {
    type Item = &'a FlowReading;
    type IntoIter = std::slice::Iter<'a, FlowReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
