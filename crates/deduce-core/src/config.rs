//! Engine configuration
//!
//! Every threshold the engine uses lives here. The thresholds at different
//! granularities (per-expense excess ratio, trend direction, table cells,
//! category exceptions) are independent settings and are never derived from
//! one another.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a three-layer resolution:
//! 1. An explicit path (the CLI's `--config`)
//! 2. Override in data dir (~/.local/share/deduce/config/engine.toml)
//! 3. Embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Category;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Baseline statistics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatisticsConfig {
    /// Minimum samples before a category gets a baseline
    pub min_samples: usize,
    /// Trailing window (months) for baselines
    pub baseline_months: u32,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            baseline_months: 12,
        }
    }
}

/// Per-expense rule settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnomalyConfig {
    /// amount / mean at or above this fires the excess rule (1.5 = 150%)
    pub excess_ratio: f64,
    /// Minor units; amounts above this need an attachment
    pub receipt_threshold: i64,
    /// Minor units; amount differences strictly below this are "the same"
    pub duplicate_amount_tolerance: i64,
    /// Maximum date distance for duplicates
    pub duplicate_window_days: i64,
    /// Days around the candidate date fetched for duplicate checks, widened
    /// to `duplicate_window_days` when smaller
    pub recent_window_days: i64,
    /// Concept terms that suggest a non-deductible expense
    pub red_flag_terms: Vec<String>,
    /// Categories that are typically not deductible
    pub non_deductible_categories: Vec<Category>,
}

impl AnomalyConfig {
    /// Days around a candidate to fetch so the duplicate rule sees every match
    pub fn recent_fetch_days(&self) -> u64 {
        self.recent_window_days
            .max(self.duplicate_window_days)
            .max(0) as u64
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            excess_ratio: 1.5,
            receipt_threshold: 25_000,
            duplicate_amount_tolerance: 100,
            duplicate_window_days: 7,
            recent_window_days: 7,
            red_flag_terms: [
                "multa",
                "sanción",
                "penalización",
                "donación personal",
                "regalo personal",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            non_deductible_categories: vec![Category::Meals, Category::Clothing],
        }
    }
}

/// Trend and category exception settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrendConfig {
    /// Variation beyond +/- this percent makes a trend up/down
    pub direction_threshold_percent: f64,
    /// Variation beyond +/- this percent highlights a table cell
    pub cell_threshold_percent: f64,
    /// current / prior - 1 at or above this raises a category exception
    pub exception_increase_ratio: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            direction_threshold_percent: 10.0,
            cell_threshold_percent: 15.0,
            exception_increase_ratio: 2.0,
        }
    }
}

/// Refresh coordination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Polling interval for alert-producing refreshes
    pub poll_interval_secs: u64,
    /// Default trend window (3, 6 or 12)
    pub trend_months: u32,
    /// Role that receives published alerts
    pub alert_role: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            trend_months: 6,
            alert_role: "owner".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub statistics: StatisticsConfig,
    pub anomaly: AnomalyConfig,
    pub trends: TrendConfig,
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Compiled-in defaults
    pub fn embedded() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load configuration (explicit path, then data-dir override, then embedded)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading engine config");
            return Self::from_file(path);
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                debug!(path = %path.display(), "Loading engine config override");
                return Self::from_file(&path);
            }
        }

        Self::embedded()
    }

    fn validate(&self) -> Result<()> {
        if self.statistics.min_samples == 0 {
            return Err(Error::Config("statistics.min_samples must be at least 1".into()));
        }
        if self.statistics.baseline_months == 0 {
            return Err(Error::Config(
                "statistics.baseline_months must be at least 1".into(),
            ));
        }
        if !(self.anomaly.excess_ratio > 0.0) {
            return Err(Error::Config("anomaly.excess_ratio must be positive".into()));
        }
        if self.anomaly.receipt_threshold < 0 || self.anomaly.duplicate_amount_tolerance < 0 {
            return Err(Error::Config("anomaly amounts must not be negative".into()));
        }
        if self.anomaly.duplicate_window_days < 0 || self.anomaly.recent_window_days < 0 {
            return Err(Error::Config("anomaly day windows must not be negative".into()));
        }
        if !matches!(self.monitor.trend_months, 3 | 6 | 12) {
            return Err(Error::Config(format!(
                "monitor.trend_months must be 3, 6 or 12 (got {})",
                self.monitor.trend_months
            )));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(Error::Config("monitor.poll_interval_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Default override location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("deduce").join("config").join("engine.toml"))
}
