//! Per-category baseline statistics
//!
//! Reduces a snapshot of expenses into mean, extrema and population standard
//! deviation per category. Categories with too few samples are left out of
//! the map entirely, which exempts them from the excess-over-mean rule.

use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StatisticsConfig;
use crate::models::{Category, Expense};

/// Default minimum number of samples for a category baseline
pub const MIN_SAMPLES: usize = 3;

/// Baseline statistics for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatistics {
    pub category: Category,
    pub count: usize,
    /// Sum of amounts, minor units
    pub total: i64,
    /// total / count
    pub mean: f64,
    pub max: i64,
    pub min: i64,
    /// Population standard deviation (divides by count)
    pub std_dev: f64,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
}

/// Category -> statistics, only for categories meeting the sample minimum
pub type StatisticsMap = BTreeMap<Category, CategoryStatistics>;

/// Inclusive date range used as the statistics baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StatsWindow {
    /// The `months` months ending at `as_of`
    pub fn trailing_months(as_of: NaiveDate, months: u32) -> Self {
        let start = as_of
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: as_of }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Computes category baselines from an expense snapshot
#[derive(Debug, Clone)]
pub struct StatisticsEngine {
    min_samples: usize,
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsEngine {
    pub fn new() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
        }
    }

    pub fn with_config(config: &StatisticsConfig) -> Self {
        Self {
            min_samples: config.min_samples.max(1),
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Statistics grouped by each expense's own category
    pub fn compute(&self, expenses: &[Expense], window: StatsWindow) -> StatisticsMap {
        self.compute_by(expenses, window, |e| e.category)
    }

    /// Statistics grouped by a caller-provided category key
    ///
    /// Records outside `window` are ignored. The result does not depend on
    /// the order of `expenses`.
    pub fn compute_by<F>(&self, expenses: &[Expense], window: StatsWindow, key: F) -> StatisticsMap
    where
        F: Fn(&Expense) -> Category,
    {
        let mut groups: BTreeMap<Category, Vec<i64>> = BTreeMap::new();
        for expense in expenses.iter().filter(|e| window.contains(e.date)) {
            groups.entry(key(expense)).or_default().push(expense.amount);
        }

        let mut stats = StatisticsMap::new();
        for (category, mut amounts) in groups {
            if amounts.len() < self.min_samples {
                debug!(
                    category = category.as_str(),
                    samples = amounts.len(),
                    "Skipping category baseline - not enough samples"
                );
                continue;
            }

            // Sorted so the floating-point sum is identical for any input order
            amounts.sort_unstable();

            let count = amounts.len();
            let total: i64 = amounts.iter().sum();
            let mean = total as f64 / count as f64;
            let variance = amounts
                .iter()
                .map(|&x| {
                    let d = x as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / count as f64;

            stats.insert(
                category,
                CategoryStatistics {
                    category,
                    count,
                    total,
                    mean,
                    max: amounts[count - 1],
                    min: amounts[0],
                    std_dev: variance.sqrt(),
                    window_start: window.start,
                    window_end: window.end,
                },
            );
        }

        stats
    }
}
