//! Month-over-month trend analysis
//!
//! Builds per-category monthly totals for the comparison view and derives
//! three separate signals, each with its own cutoff:
//! - Trend direction between a category's two most recent active months
//! - Cell highlights between adjacent month columns of the comparison table
//! - Category exceptions: the current month's total versus the previous
//!   calendar month, raised as alerts

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrendConfig;
use crate::models::{
    format_minor, Alert, AlertEvidence, AlertRule, Category, Expense, ExpenseOrigin,
    ExpenseStatus, MonthKey, Severity, VatType,
};

/// How many trailing months the comparison covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendWindow {
    Three,
    Six,
    Twelve,
}

impl TrendWindow {
    pub fn months(&self) -> u32 {
        match self {
            Self::Three => 3,
            Self::Six => 6,
            Self::Twelve => 12,
        }
    }

    /// Month keys covered by the window, oldest first, ending at `as_of`'s month
    pub fn month_keys(&self, as_of: NaiveDate) -> Vec<MonthKey> {
        let mut keys = Vec::with_capacity(self.months() as usize);
        let mut month = MonthKey::from_date(as_of);
        for _ in 0..self.months() {
            keys.push(month);
            month = month.pred();
        }
        keys.reverse();
        keys
    }

    /// First and last day covered by the window
    pub fn date_range(&self, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
        let keys = self.month_keys(as_of);
        let start = keys.first().map(|k| k.first_day()).unwrap_or(as_of);
        (start, as_of)
    }
}

impl TryFrom<u32> for TrendWindow {
    type Error = String;

    fn try_from(months: u32) -> std::result::Result<Self, Self::Error> {
        match months {
            3 => Ok(Self::Three),
            6 => Ok(Self::Six),
            12 => Ok(Self::Twelve),
            _ => Err(format!("Unsupported trend window: {} (use 3, 6 or 12)", months)),
        }
    }
}

impl std::str::FromStr for TrendWindow {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let months: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid trend window: {}", s))?;
        Self::try_from(months)
    }
}

/// Total spend for one category in one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCategoryAggregate {
    pub category: Category,
    pub month: MonthKey,
    pub total: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trend summary for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendComparison {
    pub category: Category,
    /// Active months only, oldest first
    pub months: Vec<MonthlyCategoryAggregate>,
    pub total: i64,
    /// total / number of active months
    pub monthly_average: f64,
    pub direction: TrendDirection,
    /// Change between the two most recent active months, when computable
    pub variation_percent: Option<f64>,
}

/// Highlight for a single table cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSignal {
    SignificantIncrease,
    SignificantDecrease,
    Steady,
}

/// One month column of a category row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendCell {
    pub month: MonthKey,
    /// None renders as "-"
    pub total: Option<i64>,
    /// Change versus the previous column, when both exist and it is nonzero
    pub change_percent: Option<f64>,
    pub signal: Option<CellSignal>,
}

/// One category row of the comparison table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub category: Category,
    pub cells: Vec<TrendCell>,
}

/// Everything the comparison view needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub window: TrendWindow,
    pub months: Vec<MonthKey>,
    pub comparisons: Vec<TrendComparison>,
    pub table: Vec<TrendRow>,
    pub exceptions: Vec<Alert>,
}

/// Computes trends and category exceptions over an expense snapshot
#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Full comparison for the window ending at `as_of`
    pub fn analyze(&self, expenses: &[Expense], window: TrendWindow, as_of: NaiveDate) -> TrendReport {
        self.analyze_by(expenses, window, as_of, |e| e.category)
    }

    /// Full comparison using a caller-provided category key
    pub fn analyze_by<F>(
        &self,
        expenses: &[Expense],
        window: TrendWindow,
        as_of: NaiveDate,
        key: F,
    ) -> TrendReport
    where
        F: Fn(&Expense) -> Category,
    {
        let months = window.month_keys(as_of);
        let (start, end) = window.date_range(as_of);
        let in_window: Vec<&Expense> = expenses
            .iter()
            .filter(|e| e.date >= start && e.date <= end)
            .collect();

        let aggregates = aggregate(in_window.iter().copied(), &key);
        let comparisons = self.compare(&aggregates);
        let table = self.cell_table(&aggregates, &months);
        let exceptions = self.category_exceptions_by(expenses, as_of, &key);

        debug!(
            window = window.months(),
            categories = comparisons.len(),
            exceptions = exceptions.len(),
            "Trend analysis complete"
        );

        TrendReport {
            window,
            months,
            comparisons,
            table,
            exceptions,
        }
    }

    /// Group expenses by (category, calendar month)
    pub fn aggregate(&self, expenses: &[Expense]) -> Vec<MonthlyCategoryAggregate> {
        aggregate(expenses.iter(), &|e: &Expense| e.category)
    }

    /// Per-category trend summaries from monthly aggregates
    pub fn compare(&self, aggregates: &[MonthlyCategoryAggregate]) -> Vec<TrendComparison> {
        let mut by_category: BTreeMap<Category, Vec<MonthlyCategoryAggregate>> = BTreeMap::new();
        for agg in aggregates {
            by_category.entry(agg.category).or_default().push(agg.clone());
        }

        by_category
            .into_iter()
            .map(|(category, mut months)| {
                months.sort_by_key(|m| m.month);
                let total: i64 = months.iter().map(|m| m.total).sum();
                let monthly_average = total as f64 / months.len() as f64;

                let variation_percent = match months.as_slice() {
                    [.., previous, last] => percent_change(previous.total, last.total),
                    _ => None,
                };

                TrendComparison {
                    category,
                    months,
                    total,
                    monthly_average,
                    direction: self.direction(variation_percent),
                    variation_percent,
                }
            })
            .collect()
    }

    /// Classify a category-level variation
    pub fn direction(&self, variation_percent: Option<f64>) -> TrendDirection {
        let threshold = self.config.direction_threshold_percent;
        match variation_percent {
            Some(v) if v > threshold => TrendDirection::Up,
            Some(v) if v < -threshold => TrendDirection::Down,
            _ => TrendDirection::Stable,
        }
    }

    /// Classify the change between two adjacent table cells
    pub fn cell_signal(&self, change_percent: f64) -> CellSignal {
        let threshold = self.config.cell_threshold_percent;
        if change_percent > threshold {
            CellSignal::SignificantIncrease
        } else if change_percent < -threshold {
            CellSignal::SignificantDecrease
        } else {
            CellSignal::Steady
        }
    }

    /// Comparison table: one row per category, one cell per month column
    pub fn cell_table(
        &self,
        aggregates: &[MonthlyCategoryAggregate],
        months: &[MonthKey],
    ) -> Vec<TrendRow> {
        let mut totals: BTreeMap<Category, BTreeMap<MonthKey, i64>> = BTreeMap::new();
        for agg in aggregates {
            totals
                .entry(agg.category)
                .or_default()
                .insert(agg.month, agg.total);
        }

        totals
            .into_iter()
            .map(|(category, by_month)| {
                let mut previous: Option<i64> = None;
                let cells = months
                    .iter()
                    .map(|month| {
                        let total = by_month.get(month).copied();
                        let change_percent = match (previous, total) {
                            (Some(prev), Some(curr)) => percent_change(prev, curr),
                            _ => None,
                        };
                        previous = total;
                        TrendCell {
                            month: *month,
                            total,
                            change_percent,
                            signal: change_percent.map(|c| self.cell_signal(c)),
                        }
                    })
                    .collect();
                TrendRow { category, cells }
            })
            .collect()
    }

    /// Category-exception alerts for the month containing `as_of`
    pub fn category_exceptions(&self, expenses: &[Expense], as_of: NaiveDate) -> Vec<Alert> {
        self.category_exceptions_by(expenses, as_of, &|e: &Expense| e.category)
    }

    fn category_exceptions_by<F>(&self, expenses: &[Expense], as_of: NaiveDate, key: &F) -> Vec<Alert>
    where
        F: Fn(&Expense) -> Category,
    {
        let current_month = MonthKey::from_date(as_of);
        let prior_month = current_month.pred();

        let mut current: BTreeMap<Category, i64> = BTreeMap::new();
        let mut prior: BTreeMap<Category, i64> = BTreeMap::new();
        for expense in expenses {
            let month = expense.month();
            if month == current_month {
                *current.entry(key(expense)).or_default() += expense.amount;
            } else if month == prior_month {
                *prior.entry(key(expense)).or_default() += expense.amount;
            }
        }

        let mut alerts = Vec::new();
        for (category, current_total) in current {
            let Some(&prior_total) = prior.get(&category) else {
                continue;
            };
            if prior_total == 0 {
                continue;
            }

            let ratio = current_total as f64 / prior_total as f64;
            let increase = ratio - 1.0;
            if increase < self.config.exception_increase_ratio {
                continue;
            }

            debug!(
                category = category.as_str(),
                month = %current_month,
                increase_percent = increase * 100.0,
                "Category exception detected"
            );

            let message = format!(
                "{} spending in {} is {} versus {} in {} (+{:.0}%).",
                category.label(),
                current_month,
                format_minor(current_total as f64),
                format_minor(prior_total as f64),
                prior_month,
                increase * 100.0
            );

            alerts.push(Alert::new(
                AlertRule::CategoryException,
                Severity::Warning,
                aggregate_expense(category, current_month, current_total, as_of),
                message,
                AlertEvidence {
                    ratio: Some(ratio),
                    difference: Some((current_total - prior_total) as f64),
                    variation_percent: Some(increase * 100.0),
                    baseline: Some(prior_total as f64),
                    matched_expense_id: None,
                },
            ));
        }

        alerts
    }
}

fn aggregate<'a, I, F>(expenses: I, key: &F) -> Vec<MonthlyCategoryAggregate>
where
    I: Iterator<Item = &'a Expense>,
    F: Fn(&Expense) -> Category,
{
    let mut groups: BTreeMap<(Category, MonthKey), (i64, usize)> = BTreeMap::new();
    for expense in expenses {
        let entry = groups.entry((key(expense), expense.month())).or_default();
        entry.0 += expense.amount;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((category, month), (total, count))| MonthlyCategoryAggregate {
            category,
            month,
            total,
            count,
        })
        .collect()
}

/// Percent change from `previous` to `current`; None when `previous` is zero
fn percent_change(previous: i64, current: i64) -> Option<f64> {
    if previous == 0 {
        return None;
    }
    Some((current - previous) as f64 / previous as f64 * 100.0)
}

/// Synthetic record standing in for a whole category-month
fn aggregate_expense(category: Category, month: MonthKey, total: i64, as_of: NaiveDate) -> Expense {
    let stamp = as_of.and_time(chrono::NaiveTime::MIN).and_utc();
    Expense {
        id: format!("aggregate:{}:{}", category.as_str(), month),
        date: month.first_day(),
        concept: format!("{} total for {}", category.label(), month),
        amount: total,
        category,
        vat_type: VatType::General,
        deductible: false,
        status: ExpenseStatus::PendingReview,
        origin: ExpenseOrigin::Aggregate,
        notes: None,
        attachments: Vec::new(),
        created_at: stamp,
        updated_at: stamp,
        created_by: "system".to_string(),
    }
}
