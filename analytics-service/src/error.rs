use water_client::SeriesError;

#[derive(thiserror::Error, Debug)]
pub enum AnalyticsError {
    #[error("input shape error: {0}")]
    InputShape(String),
    #[error("insufficient data for {statistic}: need at least {required} rows, got {got}")]
    InsufficientData {
        statistic: &'static str,
        required: usize,
        got: usize,
    },
    #[error("degenerate series for {statistic}: {reason}")]
    DegenerateSeries {
        statistic: &'static str,
        reason: String,
    },
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("source error: {0}")]
    Source(String),
    #[error("sink error: {0}")]
    Sink(String),
}

impl From<SeriesError> for AnalyticsError {
    fn from(e: SeriesError) -> Self {
        AnalyticsError::InputShape(e.to_string())
    }
}
