pub mod series_window;

pub use series_window::{flow_profile, quality_profile, trailing_window};
