use std::collections::HashMap;

use time::{OffsetDateTime, UtcOffset};

use crate::error::SeriesError;

/// One quality measurement for a single parameter, with that parameter's
/// regulatory safe range.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityReading {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub parameter: String,
    pub value: f64,
    pub safe_min: f64,
    pub safe_max: f64,
}

impl QualityReading {
    /// Inclusive on both bounds.
    pub fn in_range(&self) -> bool {
        self.safe_min <= self.value && self.value <= self.safe_max
    }
}

/// Quality readings for every parameter of the site, ordered by
/// `(parameter, timestamp)` so each parameter occupies one contiguous slice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualitySeries {
    readings: Vec<QualityReading>,
}

impl QualitySeries {
    pub fn from_readings(mut readings: Vec<QualityReading>) -> Result<Self, SeriesError> {
        let expected: Option<UtcOffset> = readings.first().map(|r| r.timestamp.offset());
        let mut ranges: HashMap<&str, (f64, f64)> = HashMap::new();

        for r in &readings {
            if r.parameter.trim().is_empty() {
                return Err(SeriesError::EmptyParameter { ts: r.timestamp });
            }
            if let Some(expected) = expected {
                if r.timestamp.offset() != expected {
                    return Err(SeriesError::MixedOffsets {
                        expected,
                        found: r.timestamp.offset(),
                    });
                }
            }
            let fields = [("value", r.value), ("safe_min", r.safe_min), ("safe_max", r.safe_max)];
            for (field, v) in fields {
                if !v.is_finite() {
                    return Err(SeriesError::NonFinite { field, ts: r.timestamp });
                }
            }
            if r.safe_min > r.safe_max {
                return Err(SeriesError::InvertedRange {
                    parameter: r.parameter.clone(),
                    min: r.safe_min,
                    max: r.safe_max,
                });
            }
            let range = ranges
                .entry(r.parameter.as_str())
                .or_insert((r.safe_min, r.safe_max));
            if *range != (r.safe_min, r.safe_max) {
                return Err(SeriesError::InconsistentRange {
                    parameter: r.parameter.clone(),
                });
            }
        }

        readings.sort_by(|a, b| {
            a.parameter
                .cmp(&b.parameter)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        if let Some(w) = readings
            .windows(2)
            .find(|w| w[0].parameter == w[1].parameter && w[0].timestamp == w[1].timestamp)
        {
            return Err(SeriesError::DuplicateTimestamp { ts: w[1].timestamp });
        }

        Ok(Self { readings })
    }

    pub(crate) fn from_sorted_unchecked(readings: Vec<QualityReading>) -> Self {
        Self { readings }
    }

    pub fn readings(&self) -> &[QualityReading] {
        &self.readings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QualityReading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn offset(&self) -> Option<UtcOffset> {
        self.readings.first().map(|r| r.timestamp.offset())
    }

    /// Latest timestamp across all parameters.
    pub fn last_timestamp(&self) -> Option<OffsetDateTime> {
        self.readings.iter().map(|r| r.timestamp).max()
    }

    /// Distinct parameter identifiers in sorted order.
    pub fn parameters(&self) -> Vec<&str> {
        self.by_parameter().map(|(p, _)| p).collect()
    }

    /// Time-ordered readings of one parameter; empty when unknown.
    pub fn for_parameter(&self, parameter: &str) -> &[QualityReading] {
        let start = self
            .readings
            .partition_point(|r| r.parameter.as_str() < parameter);
        let end = self
            .readings
            .partition_point(|r| r.parameter.as_str() <= parameter);
        &self.readings[start..end]
    }

    /// Iterate `(parameter, readings)` groups, each time-ordered.
    pub fn by_parameter(&self) -> impl Iterator<Item = (&str, &[QualityReading])> + '_ {
        self.readings
            .chunk_by(|a, b| a.parameter == b.parameter)
            .map(|group| (group[0].parameter.as_str(), group))
    }

    pub fn safe_range(&self, parameter: &str) -> Option<(f64, f64)> {
        self.for_parameter(parameter)
            .first()
            .map(|r| (r.safe_min, r.safe_max))
    }
}

impl<'a> IntoIterator for &'a QualitySeries {
    type Item = &'a QualityReading;
    type IntoIter = std::slice::Iter<'a, QualityReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
