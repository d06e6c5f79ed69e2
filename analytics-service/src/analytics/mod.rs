pub mod aggregation;
pub mod alerts;
pub mod anomaly;
pub mod compliance;
pub mod seasonal;
pub mod stats;
pub mod table;

pub use aggregation::{
    daily_totals, hour_dow_heatmap, shift_aggregates, shift_of, DailyAggregate, HourDowHeatmap,
    Shift, ShiftAggregate,
};
pub use alerts::{
    advisory_for, alert_digest, quality_latest_breaches, recommendation_summary,
    simple_recommendations, AlertDigest, LatestBreach, LatestBreaches, Recommendation,
    GENERIC_ADVISORY,
};
pub use anomaly::{
    flow_anomalies, flow_anomalies_with, AnomalyFlag, AnomalyOptions, MAD_CONSISTENCY,
};
pub use compliance::{
    breach_events, breach_events_with, daily_compliance, BreachEvent, BreachOptions, ComplianceRow,
};
pub use seasonal::{
    humidity_vs_flow, monthly_rollups, HumidityFlowReport, HumidityFlowRow, MonthlyFlowRow,
    MonthlyQualityRow, MonthlyRollups, DEFAULT_HUMIDITY_PARAMETER,
};
pub use table::{Table, TableRow};
