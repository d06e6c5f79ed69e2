use serde::Deserialize;
use std::{fs, path::PathBuf};
use time::{format_description::well_known::Rfc3339, Duration, UtcOffset};

use crate::{
    analytics::{AnomalyOptions, BreachOptions, DEFAULT_HUMIDITY_PARAMETER},
    dispatch::{DispatchSettings, PlannerLimits},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Fixed UTC offset of the site's local clock, e.g. `+05:30`.
    pub utc_offset: String,
    pub flow_path: PathBuf,
    pub quality_path: PathBuf,
    pub humidity_parameter: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            utc_offset: "+05:30".to_string(),
            flow_path: PathBuf::from("data/flow.csv"),
            quality_path: PathBuf::from("data/quality.csv"),
            humidity_parameter: DEFAULT_HUMIDITY_PARAMETER.to_string(),
        }
    }
}

impl SiteConfig {
    pub fn offset(&self) -> anyhow::Result<UtcOffset> {
        // Borrow RFC 3339's offset grammar by parsing a fixed instant.
        let sample = format!("2000-01-01T00:00:00{}", self.utc_offset.trim());
        let ts = time::OffsetDateTime::parse(&sample, &Rfc3339)
            .map_err(|e| anyhow::anyhow!("invalid site.utc_offset '{}': {e}", self.utc_offset))?;
        Ok(ts.offset())
    }
}

/// Ten years of hourly lookback.
const MAX_LOOKBACK_HOURS: i64 = 24 * 3660;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub anomaly_window: usize,
    pub anomaly_k: f64,
    pub breach_gap_factor: f64,
    pub lookback_hours: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        let anomaly = AnomalyOptions::default();
        Self {
            anomaly_window: anomaly.window,
            anomaly_k: anomaly.k,
            breach_gap_factor: BreachOptions::default().gap_factor,
            lookback_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub default_range_days: Option<u32>,
    pub max_range_days: u32,
    pub max_min_duration_min: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let limits = PlannerLimits::default();
        Self {
            default_range_days: limits.default_range_days,
            max_range_days: limits.max_range_days,
            max_min_duration_min: limits.max_min_duration_min,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub output_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub analytics: AnalyticsConfig,
    pub planner: PlannerConfig,
    pub artifacts: ArtifactsConfig,
    pub server: Option<ServerConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("ANALYTICS_CONFIG").unwrap_or_else(|_| "analytics-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.site.offset()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let a = &self.analytics;
        if a.anomaly_window == 0 {
            anyhow::bail!("analytics.anomaly_window must be at least 1");
        }
        if !(a.anomaly_k.is_finite() && a.anomaly_k > 0.0) {
            anyhow::bail!("analytics.anomaly_k must be finite and positive, got {}", a.anomaly_k);
        }
        if !(a.breach_gap_factor.is_finite() && a.breach_gap_factor >= 1.0) {
            anyhow::bail!(
                "analytics.breach_gap_factor must be finite and at least 1.0, got {}",
                a.breach_gap_factor
            );
        }
        if !(1..=MAX_LOOKBACK_HOURS).contains(&a.lookback_hours) {
            anyhow::bail!(
                "analytics.lookback_hours must be within 1..={MAX_LOOKBACK_HOURS}, got {}",
                a.lookback_hours
            );
        }

        let p = &self.planner;
        if p.max_range_days == 0 {
            anyhow::bail!("planner.max_range_days must be at least 1");
        }
        if !(p.max_min_duration_min.is_finite() && p.max_min_duration_min >= 0.0) {
            anyhow::bail!(
                "planner.max_min_duration_min must be finite and non-negative, got {}",
                p.max_min_duration_min
            );
        }
        Ok(())
    }

    pub fn anomaly_options(&self) -> AnomalyOptions {
        AnomalyOptions {
            window: self.analytics.anomaly_window,
            k: self.analytics.anomaly_k,
        }
    }

    pub fn breach_options(&self) -> BreachOptions {
        BreachOptions {
            gap_factor: self.analytics.breach_gap_factor,
        }
    }

    pub fn lookback(&self) -> Duration {
        Duration::hours(self.analytics.lookback_hours.clamp(1, MAX_LOOKBACK_HOURS))
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            limits: PlannerLimits {
                default_range_days: self.planner.default_range_days,
                max_range_days: self.planner.max_range_days,
                max_min_duration_min: self.planner.max_min_duration_min,
            },
            humidity_parameter: self.site.humidity_parameter.clone(),
            breach: self.breach_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.site.offset().unwrap(), offset!(+05:30));
        assert_eq!(cfg.anomaly_options(), AnomalyOptions::default());
        assert_eq!(cfg.lookback(), Duration::hours(24));
        assert!(cfg.server.is_none());
        assert_eq!(cfg.dispatch_settings(), DispatchSettings::default());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [site]
            utc_offset = "-03:00"
            humidity_parameter = "RH"

            [analytics]
            anomaly_window = 12
            breach_gap_factor = 3.0

            [planner]
            default_range_days = 7
            max_range_days = 90

            [server]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.site.offset().unwrap(), offset!(-03:00));
        assert_eq!(cfg.anomaly_options().window, 12);
        assert_eq!(cfg.anomaly_options().k, 3.0);
        let settings = cfg.dispatch_settings();
        assert_eq!(settings.humidity_parameter, "RH");
        assert_eq!(settings.limits.default_range_days, Some(7));
        assert_eq!(settings.limits.max_range_days, 90);
        assert_eq!(settings.breach.gap_factor, 3.0);
        assert_eq!(cfg.server.unwrap().bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn invalid_offset_is_rejected() {
        assert!(AppConfig::from_toml_str("[site]\nutc_offset = \"IST\"\n").is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(AppConfig::from_toml_str("[analytics]\nanomaly_window = 0\n").is_err());
    }

    #[test]
    fn non_finite_or_out_of_bounds_analytics_values_are_rejected() {
        for bad in [
            "breach_gap_factor = inf",
            "breach_gap_factor = nan",
            "breach_gap_factor = 0.5",
            "anomaly_k = inf",
            "anomaly_k = 0.0",
            "anomaly_k = -1.0",
            "lookback_hours = 0",
            "lookback_hours = 9223372036854775807",
        ] {
            let err = AppConfig::from_toml_str(&format!("[analytics]\n{bad}\n"));
            assert!(err.is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn planner_bounds_are_validated() {
        assert!(AppConfig::from_toml_str("[planner]\nmax_range_days = 0\n").is_err());
        assert!(AppConfig::from_toml_str("[planner]\nmax_min_duration_min = inf\n").is_err());
        assert!(AppConfig::from_toml_str("[planner]\nmax_min_duration_min = -1.0\n").is_err());
    }

    #[test]
    fn accepted_options_drive_breach_segmentation() {
        use crate::analytics::breach_events_with;
        use time::macros::datetime;
        use water_client::{QualityReading, QualitySeries};

        let cfg = AppConfig::from_toml_str("[analytics]\nbreach_gap_factor = 1e300\n").unwrap();
        let base = datetime!(2024-03-01 00:00:00 +05:30);
        let quality = QualitySeries::from_readings(
            [0i64, 5, 10, 70]
                .iter()
                .map(|m| QualityReading {
                    timestamp: base + Duration::minutes(*m),
                    parameter: "pH".to_string(),
                    value: 9.0,
                    safe_min: 6.5,
                    safe_max: 8.5,
                })
                .collect(),
        )
        .unwrap();

        let events = breach_events_with(&quality, &cfg.breach_options());
        assert_eq!(events.len(), 1);
    }
}
