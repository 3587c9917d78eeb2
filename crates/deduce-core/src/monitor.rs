//! Expense monitor
//!
//! Coordinates the pure engine components with the repository and alert sink:
//! fetches fresh snapshots (concurrently where independent), runs statistics,
//! rules and trends over them, and delivers alerts.
//!
//! Repository failures are fail-open: they are logged and treated as an empty
//! snapshot, so a broken data source never blocks saving an expense. Only
//! validation errors reach the caller.
//!
//! Trend refreshes take a generation token before fetching. A refresh whose
//! token is no longer current when its data arrives is discarded, so a slow
//! response never overwrites the result of a newer request.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::anomaly::{select_most_severe, AnomalyDetector};
use crate::categorize::vat_type_for;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{Alert, Expense, MonthKey, NewExpense};
use crate::repository::{ExpenseFilter, ExpenseRepository};
use crate::sink::AlertSink;
use crate::statistics::{StatisticsEngine, StatisticsMap, StatsWindow};
use crate::trends::{TrendAnalyzer, TrendReport, TrendWindow};
use crate::validation::{validate_expense, validate_new};

/// Id given to candidates that have not been saved yet
pub const UNSAVED_CANDIDATE_ID: &str = "candidate";

/// Token identifying one refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

/// Monotonic source of refresh tokens
#[derive(Debug, Default)]
pub struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding every earlier one
    pub fn begin(&self) -> Generation {
        Generation(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.0.load(Ordering::SeqCst) == generation.0
    }
}

/// Outcome of a generation-guarded refresh
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh<T> {
    Applied(T),
    /// A newer request started while this one was fetching
    Discarded,
}

impl<T> Refresh<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Discarded => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded)
    }
}

/// Result of checking one candidate expense
#[derive(Debug, Clone, Serialize)]
pub struct CandidateCheck {
    pub candidate: Expense,
    /// The alert to surface (most severe finding)
    pub alert: Option<Alert>,
    /// Every rule that fired, in evaluation order
    pub findings: Vec<Alert>,
    /// Categories with a baseline at check time
    pub baseline_categories: usize,
}

/// Counts from delivering alerts to a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub published: usize,
    pub failed: usize,
}

impl PublishSummary {
    fn record(&mut self, delivered: bool) {
        if delivered {
            self.published += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Caller-side coordinator for the engine
pub struct ExpenseMonitor {
    repository: Arc<dyn ExpenseRepository>,
    config: EngineConfig,
    statistics: StatisticsEngine,
    detector: AnomalyDetector,
    analyzer: TrendAnalyzer,
    generation: GenerationCounter,
}

impl ExpenseMonitor {
    pub fn new(repository: Arc<dyn ExpenseRepository>, config: EngineConfig) -> Self {
        Self {
            statistics: StatisticsEngine::with_config(&config.statistics),
            detector: AnomalyDetector::with_config(config.anomaly.clone()),
            analyzer: TrendAnalyzer::with_config(config.trends.clone()),
            generation: GenerationCounter::new(),
            repository,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Configured default trend window
    pub fn default_trend_window(&self) -> TrendWindow {
        TrendWindow::try_from(self.config.monitor.trend_months).unwrap_or(TrendWindow::Six)
    }

    pub fn baseline_window(&self, as_of: NaiveDate) -> StatsWindow {
        StatsWindow::trailing_months(as_of, self.config.statistics.baseline_months)
    }

    /// Category baselines over the trailing window ending at `as_of`
    pub async fn baseline(&self, as_of: NaiveDate) -> StatisticsMap {
        let window = self.baseline_window(as_of);
        let expenses = self
            .fetch_or_empty(&ExpenseFilter::between(window.start, window.end), "baseline")
            .await;
        self.statistics.compute(&expenses, window)
    }

    /// Validate and check an expense that has not been saved yet
    pub async fn check_new(&self, new: &NewExpense, as_of: NaiveDate) -> Result<CandidateCheck> {
        let category = validate_new(new)?;
        let mut candidate = new.to_candidate(UNSAVED_CANDIDATE_ID, category, Utc::now());
        if new.vat_type.is_none() {
            candidate.vat_type = vat_type_for(category, &candidate.concept);
        }
        self.check_expense(candidate, as_of).await
    }

    /// Check a candidate against the baseline and the expenses around its date
    ///
    /// The candidate's own id is excluded from both snapshots, so re-checking
    /// a saved expense neither inflates its baseline nor matches itself.
    pub async fn check_expense(&self, candidate: Expense, as_of: NaiveDate) -> Result<CandidateCheck> {
        validate_expense(&candidate)?;

        let window = self.baseline_window(as_of);
        let recent_days = chrono::Days::new(self.config.anomaly.recent_fetch_days());
        let recent_filter = ExpenseFilter::between(
            candidate.date.checked_sub_days(recent_days).unwrap_or(NaiveDate::MIN),
            candidate.date.checked_add_days(recent_days).unwrap_or(NaiveDate::MAX),
        );
        let baseline_filter = ExpenseFilter::between(window.start, window.end);

        let (baseline, recent) = tokio::join!(
            self.fetch_or_empty(&baseline_filter, "baseline"),
            self.fetch_or_empty(&recent_filter, "recent"),
        );

        let baseline: Vec<Expense> = baseline
            .into_iter()
            .filter(|e| e.id != candidate.id)
            .collect();
        let recent: Vec<Expense> = recent
            .into_iter()
            .filter(|e| e.id != candidate.id)
            .collect();

        let stats = self.statistics.compute(&baseline, window);
        let findings = self.detector.findings(&candidate, &stats, &recent);
        let alert = select_most_severe(findings.clone());

        debug!(
            expense = %candidate.id,
            findings = findings.len(),
            flagged = alert.is_some(),
            "Candidate checked"
        );

        Ok(CandidateCheck {
            candidate,
            alert,
            findings,
            baseline_categories: stats.len(),
        })
    }

    /// Trend report for `window` ending at `as_of`
    ///
    /// Returns [`Refresh::Discarded`] when a newer refresh started while this
    /// one was fetching.
    pub async fn trends(&self, window: TrendWindow, as_of: NaiveDate) -> Refresh<TrendReport> {
        let generation = self.generation.begin();

        let (start, end) = window.date_range(as_of);
        let exception_start = MonthKey::from_date(as_of).pred().first_day();
        let trend_filter = ExpenseFilter::between(start, end);
        let exception_filter = ExpenseFilter::between(exception_start, as_of);

        let (trend_expenses, exception_expenses) = tokio::join!(
            self.fetch_or_empty(&trend_filter, "trends"),
            self.fetch_or_empty(&exception_filter, "exceptions"),
        );

        if !self.generation.is_current(generation) {
            debug!(?generation, "Discarding superseded trend refresh");
            return Refresh::Discarded;
        }

        let mut report = self.analyzer.analyze(&trend_expenses, window, as_of);
        report.exceptions = self.analyzer.category_exceptions(&exception_expenses, as_of);
        Refresh::Applied(report)
    }

    /// Category exceptions for the month containing `as_of`
    pub async fn category_exceptions(&self, as_of: NaiveDate) -> Vec<Alert> {
        let start = MonthKey::from_date(as_of).pred().first_day();
        let expenses = self
            .fetch_or_empty(&ExpenseFilter::between(start, as_of), "exceptions")
            .await;
        self.analyzer.category_exceptions(&expenses, as_of)
    }

    /// Deliver alerts to `sink`; failures are logged and counted
    pub async fn publish(&self, alerts: &[Alert], sink: &dyn AlertSink) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for alert in alerts {
            summary.record(self.deliver(alert, sink).await);
        }
        summary
    }

    /// One polling pass: refresh exceptions and publish the ones not yet seen
    ///
    /// Each delivered alert is marked seen on its own, so a later pass only
    /// retries the ones the sink rejected.
    pub async fn poll_once(
        &self,
        sink: &dyn AlertSink,
        as_of: NaiveDate,
        seen: &mut HashSet<String>,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for alert in self.category_exceptions(as_of).await {
            if seen.contains(&alert.id) {
                continue;
            }
            let delivered = self.deliver(&alert, sink).await;
            if delivered {
                seen.insert(alert.id);
            }
            summary.record(delivered);
        }
        summary
    }

    async fn deliver(&self, alert: &Alert, sink: &dyn AlertSink) -> bool {
        match sink.create(alert.to_record(&self.config.monitor.alert_role)).await {
            Ok(record) => {
                debug!(alert = %alert.id, record = %record.id, "Alert published");
                true
            }
            Err(e) => {
                warn!(alert = %alert.id, rule = alert.rule.as_str(), "Failed to publish alert: {}", e);
                false
            }
        }
    }

    async fn fetch_or_empty(&self, filter: &ExpenseFilter, purpose: &str) -> Vec<Expense> {
        match self.repository.query(filter).await {
            Ok(expenses) => expenses,
            Err(e) => {
                warn!(purpose, "Expense fetch failed, continuing with no data: {}", e);
                Vec::new()
            }
        }
    }
}

/// Start polling for category exceptions as a background task
///
/// The first pass runs immediately; later passes follow the configured
/// interval. Each alert is published once per task.
pub fn spawn_alert_poller(monitor: Arc<ExpenseMonitor>, sink: Arc<dyn AlertSink>) -> JoinHandle<()> {
    let period = monitor.config().monitor.poll_interval();
    info!("Starting alert poller: every {} seconds", period.as_secs());

    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut seen = HashSet::new();

        loop {
            ticker.tick().await;

            let as_of = Utc::now().date_naive();
            let summary = monitor.poll_once(sink.as_ref(), as_of, &mut seen).await;
            if summary.published > 0 || summary.failed > 0 {
                info!(
                    published = summary.published,
                    failed = summary.failed,
                    "Alert poll complete"
                );
            }
        }
    })
}
