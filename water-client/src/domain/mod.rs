mod flow_reading;
mod quality_reading;

pub use flow_reading::{interval_consumption, FlowReading, FlowSeries};
pub use quality_reading::{QualityReading, QualitySeries};
