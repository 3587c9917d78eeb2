//! Deduce Core Library
//!
//! Expense anomaly detection and trend analysis for a deductible-expense
//! tracker:
//! - Per-category baseline statistics over a trailing window
//! - Review rules for new expenses (excess over mean, deductibility
//!   mismatch, missing receipt, duplicates)
//! - Month-over-month trends and category spending exceptions
//! - Repository and alert sink interfaces, with in-memory implementations
//! - A monitor that coordinates fetching, fail-open checks and alert polling
//! - Keyword categorization, summaries and CSV/JSON import

pub mod anomaly;
pub mod categorize;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod monitor;
pub mod repository;
pub mod sink;
pub mod statistics;
pub mod summary;
pub mod trends;
pub mod validation;

/// Test utilities: expense builders and failing/delayed collaborators
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use anomaly::AnomalyDetector;
pub use categorize::{categorize, vat_type_for};
pub use config::{AnomalyConfig, EngineConfig, MonitorConfig, StatisticsConfig, TrendConfig};
pub use error::{Error, Result};
pub use models::*;
pub use monitor::{
    spawn_alert_poller, CandidateCheck, ExpenseMonitor, Generation, GenerationCounter,
    PublishSummary, Refresh,
};
pub use repository::{ExpenseFilter, ExpenseRepository, InMemoryExpenseRepository};
pub use sink::{AlertPriority, AlertRecord, AlertSink, LogAlertSink, MemoryAlertSink, NewAlertRecord};
pub use statistics::{CategoryStatistics, StatisticsEngine, StatisticsMap, StatsWindow, MIN_SAMPLES};
pub use summary::{summarize, CategoryBreakdown, ExpenseSummary};
pub use trends::{
    CellSignal, MonthlyCategoryAggregate, TrendAnalyzer, TrendCell, TrendComparison,
    TrendDirection, TrendReport, TrendRow, TrendWindow,
};
