use time::{OffsetDateTime, UtcOffset};

/// Shape violations detected while building a series.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("readings are not sorted by timestamp at index {index}")]
    Unsorted { index: usize },
    #[error("duplicate timestamp {ts}")]
    DuplicateTimestamp { ts: OffsetDateTime },
    #[error("mixed utc offsets: expected {expected}, found {found}")]
    MixedOffsets { expected: UtcOffset, found: UtcOffset },
    #[error("non-finite {field} at {ts}")]
    NonFinite { field: &'static str, ts: OffsetDateTime },
    #[error("negative consumption {value} at {ts}")]
    NegativeConsumption { value: f64, ts: OffsetDateTime },
    #[error("parameter '{parameter}' has safe_min {min} > safe_max {max}")]
    InvertedRange { parameter: String, min: f64, max: f64 },
    #[error("parameter '{parameter}' changes its safe range within the dataset")]
    InconsistentRange { parameter: String },
    #[error("empty parameter identifier at {ts}")]
    EmptyParameter { ts: OffsetDateTime },
}
