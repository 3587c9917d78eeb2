//! Expense totals and per-category breakdown

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Category, Expense};

/// Totals for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: Category,
    pub total: i64,
    pub deductible: i64,
    pub non_deductible: i64,
    pub count: usize,
    /// Share of the overall total, 0-100
    pub percentage: f64,
}

/// Overview of a set of expenses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseSummary {
    pub total: i64,
    pub deductible_total: i64,
    pub non_deductible_total: i64,
    pub count: usize,
    pub deductible_count: usize,
    /// total / count, 0 when empty
    pub average: f64,
    /// Largest category first
    pub categories: Vec<CategoryBreakdown>,
}

pub fn summarize(expenses: &[Expense]) -> ExpenseSummary {
    let mut total = 0i64;
    let mut deductible_total = 0i64;
    let mut deductible_count = 0usize;
    let mut by_category: BTreeMap<Category, (i64, i64, i64, usize)> = BTreeMap::new();

    for expense in expenses {
        total += expense.amount;
        let entry = by_category.entry(expense.category).or_default();
        entry.0 += expense.amount;
        entry.3 += 1;
        if expense.deductible {
            deductible_total += expense.amount;
            deductible_count += 1;
            entry.1 += expense.amount;
        } else {
            entry.2 += expense.amount;
        }
    }

    let mut categories: Vec<CategoryBreakdown> = by_category
        .into_iter()
        .map(|(category, (cat_total, deductible, non_deductible, count))| CategoryBreakdown {
            category,
            total: cat_total,
            deductible,
            non_deductible,
            count,
            percentage: if total > 0 {
                cat_total as f64 * 100.0 / total as f64
            } else {
                0.0
            },
        })
        .collect();
    // Stable sort keeps category order among equal totals
    categories.sort_by(|a, b| b.total.cmp(&a.total));

    ExpenseSummary {
        total,
        deductible_total,
        non_deductible_total: total - deductible_total,
        count: expenses.len(),
        deductible_count,
        average: if expenses.is_empty() {
            0.0
        } else {
            total as f64 / expenses.len() as f64
        },
        categories,
    }
}
