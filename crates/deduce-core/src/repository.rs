//! Expense storage interface
//!
//! The engine never owns persistence. It reads snapshots through the
//! [`ExpenseRepository`] trait; [`InMemoryExpenseRepository`] backs the CLI
//! and tests and also supports the write operations of the expense tracker
//! (create, partial update, delete, status validation).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::categorize::{categorize, vat_type_for};
use crate::error::{Error, Result};
use crate::models::{Category, Expense, ExpenseStatus, ExpenseUpdate, NewExpense};
use crate::validation::validate_new;

/// Query filter; every field is optional and all given fields must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseFilter {
    /// Inclusive
    pub start: Option<NaiveDate>,
    /// Inclusive
    pub end: Option<NaiveDate>,
    pub category: Option<Category>,
    pub status: Option<ExpenseStatus>,
    /// Case-insensitive search over concept and notes
    pub text: Option<String>,
    /// Case-insensitive search over the concept only
    pub concept: Option<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
}

impl ExpenseFilter {
    /// Expenses dated within `[start, end]`
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        if self.start.is_some_and(|start| expense.date < start) {
            return false;
        }
        if self.end.is_some_and(|end| expense.date > end) {
            return false;
        }
        if self.category.is_some_and(|c| expense.category != c) {
            return false;
        }
        if self.status.is_some_and(|s| expense.status != s) {
            return false;
        }
        if let Some(text) = &self.text {
            let text = text.to_lowercase();
            let in_concept = expense.concept.to_lowercase().contains(&text);
            let in_notes = expense
                .notes
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(&text));
            if !in_concept && !in_notes {
                return false;
            }
        }
        if let Some(concept) = &self.concept {
            if !expense
                .concept
                .to_lowercase()
                .contains(&concept.to_lowercase())
            {
                return false;
            }
        }
        if self.min_amount.is_some_and(|min| expense.amount < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| expense.amount > max) {
            return false;
        }
        true
    }
}

/// Read access to stored expenses
#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Expenses matching `filter`, most recent first
    async fn query(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>>;

    async fn query_by_id(&self, id: &str) -> Result<Option<Expense>>;
}

/// Ordered in-memory expense store
#[derive(Debug, Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<BTreeMap<String, Expense>>,
    sequence: AtomicU64,
}

impl InMemoryExpenseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-loaded with existing records (ids are kept)
    pub fn with_expenses(expenses: Vec<Expense>) -> Self {
        let map = expenses.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self {
            expenses: RwLock::new(map),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.expenses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.expenses.read().await.is_empty()
    }

    /// Store a new expense
    ///
    /// Categorizes from the concept when no category is given and derives the
    /// VAT type when none is given. New records start pending review.
    pub async fn create(&self, new: NewExpense) -> Result<Expense> {
        let category = validate_new(&new)?;
        let now = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("exp-{}-{}", now.timestamp_millis(), seq);

        let mut expense = new.to_candidate(&id, category, now);
        if new.vat_type.is_none() {
            expense.vat_type = vat_type_for(category, &expense.concept);
        }

        info!(
            id = %expense.id,
            category = category.as_str(),
            amount = expense.amount,
            "Created expense"
        );

        self.expenses
            .write()
            .await
            .insert(id, expense.clone());
        Ok(expense)
    }

    /// Apply a partial update
    ///
    /// A changed concept without an explicit category re-categorizes the record.
    pub async fn update(&self, id: &str, changes: ExpenseUpdate) -> Result<Expense> {
        if changes.concept.as_ref().is_some_and(|c| c.trim().is_empty()) {
            return Err(Error::InvalidData("Expense concept is required".into()));
        }
        if let Some(amount) = changes.amount.filter(|a| *a <= 0) {
            return Err(Error::InvalidData(format!(
                "Expense amount must be positive (got {})",
                amount
            )));
        }

        let mut expenses = self.expenses.write().await;
        let expense = expenses
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Expense {}", id)))?;

        if let Some(concept) = changes.concept {
            if changes.category.is_none() {
                expense.category = categorize(&concept);
            }
            expense.concept = concept;
        }
        if let Some(amount) = changes.amount {
            expense.amount = amount;
        }
        if let Some(date) = changes.date {
            expense.date = date;
        }
        if let Some(category) = changes.category {
            expense.category = category;
        }
        if let Some(vat_type) = changes.vat_type {
            expense.vat_type = vat_type;
        }
        if let Some(deductible) = changes.deductible {
            expense.deductible = deductible;
        }
        if let Some(status) = changes.status {
            expense.status = status;
        }
        if let Some(notes) = changes.notes {
            expense.notes = Some(notes);
        }
        if let Some(attachments) = changes.attachments {
            expense.attachments = attachments;
        }
        expense.updated_at = Utc::now();

        debug!(id, "Updated expense");
        Ok(expense.clone())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.expenses.write().await.remove(id).is_none() {
            return Err(Error::NotFound(format!("Expense {}", id)));
        }
        debug!(id, "Deleted expense");
        Ok(())
    }

    /// Change review status, recording the reason in the notes when given
    pub async fn validate(
        &self,
        id: &str,
        status: ExpenseStatus,
        reason: Option<&str>,
    ) -> Result<Expense> {
        let mut expenses = self.expenses.write().await;
        let expense = expenses
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Expense {}", id)))?;

        let previous = expense.status;
        expense.status = status;
        if let Some(reason) = reason {
            let entry = format!("[Validation {}]: {}", status, reason);
            expense.notes = Some(match expense.notes.as_deref() {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{}\n{}", existing.trim_end(), entry)
                }
                _ => entry,
            });
        }
        expense.updated_at = Utc::now();

        info!(id, from = %previous, to = %status, "Expense status changed");
        Ok(expense.clone())
    }
}

#[async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn query(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let expenses = self.expenses.read().await;
        let mut matched: Vec<Expense> = expenses
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn query_by_id(&self, id: &str) -> Result<Option<Expense>> {
        Ok(self.expenses.read().await.get(id).cloned())
    }
}
