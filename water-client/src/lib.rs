pub mod domain;
pub mod error;
pub mod query;

pub use domain::{FlowReading, FlowSeries, QualityReading, QualitySeries};
pub use error::SeriesError;
