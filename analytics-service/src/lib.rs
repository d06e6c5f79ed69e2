pub mod analytics;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics_server;
pub mod observability;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use dispatch::{dispatch, Action, PlannedQuery, QueryOutput};
pub use error::AnalyticsError;
