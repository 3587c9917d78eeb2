//! Test utilities for deduce-core
//!
//! Expense builders plus collaborator doubles (a repository that always
//! fails, one that answers after a scripted delay, a sink that rejects
//! everything and one that rejects a single call) for unit and integration
//! tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::models::{
    Attachment, Category, Expense, ExpenseOrigin, ExpenseStatus, VatType,
};
use crate::repository::{ExpenseFilter, ExpenseRepository};
use crate::sink::{AlertRecord, AlertSink, MemoryAlertSink, NewAlertRecord};

/// Shorthand for a valid calendar date
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

fn timestamp(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0).expect("valid time").and_utc()
}

/// A deductible expense without attachments
pub fn expense(id: &str, date: NaiveDate, concept: &str, amount: i64, category: Category) -> Expense {
    ExpenseBuilder::new(id)
        .date(date)
        .concept(concept)
        .amount(amount)
        .category(category)
        .build()
}

/// Builder for expenses with non-default fields
pub struct ExpenseBuilder {
    expense: Expense,
}

impl ExpenseBuilder {
    pub fn new(id: &str) -> Self {
        let day = date(2024, 1, 1);
        Self {
            expense: Expense {
                id: id.to_string(),
                date: day,
                concept: "Test expense".to_string(),
                amount: 1_000,
                category: Category::Other,
                vat_type: VatType::General,
                deductible: true,
                status: ExpenseStatus::PendingReview,
                origin: ExpenseOrigin::Manual,
                notes: None,
                attachments: Vec::new(),
                created_at: timestamp(day),
                updated_at: timestamp(day),
                created_by: "test-user".to_string(),
            },
        }
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.expense.date = date;
        self.expense.created_at = timestamp(date);
        self.expense.updated_at = timestamp(date);
        self
    }

    pub fn concept(mut self, concept: &str) -> Self {
        self.expense.concept = concept.to_string();
        self
    }

    pub fn amount(mut self, amount: i64) -> Self {
        self.expense.amount = amount;
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.expense.category = category;
        self
    }

    pub fn deductible(mut self, deductible: bool) -> Self {
        self.expense.deductible = deductible;
        self
    }

    pub fn attachment(mut self, url: &str) -> Self {
        self.expense.attachments.push(Attachment::reference(url));
        self
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.expense.notes = Some(notes.to_string());
        self
    }

    pub fn build(self) -> Expense {
        self.expense
    }
}

/// Repository whose every call fails
pub struct FailingRepository;

#[async_trait]
impl ExpenseRepository for FailingRepository {
    async fn query(&self, _filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        Err(Error::Repository("repository unavailable".to_string()))
    }

    async fn query_by_id(&self, _id: &str) -> Result<Option<Expense>> {
        Err(Error::Repository("repository unavailable".to_string()))
    }
}

/// Repository that answers from a fixed set after a scripted delay per call
///
/// Delays are consumed in call order; calls beyond the script answer at once.
pub struct DelayedRepository {
    expenses: Vec<Expense>,
    delays: Mutex<VecDeque<Duration>>,
}

impl DelayedRepository {
    pub fn new(expenses: Vec<Expense>, delays: Vec<Duration>) -> Self {
        Self {
            expenses,
            delays: Mutex::new(delays.into()),
        }
    }
}

#[async_trait]
impl ExpenseRepository for DelayedRepository {
    async fn query(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let delay = self
            .delays
            .lock()
            .map_err(|e| Error::Repository(e.to_string()))?
            .pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .expenses
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn query_by_id(&self, id: &str) -> Result<Option<Expense>> {
        Ok(self.expenses.iter().find(|e| e.id == id).cloned())
    }
}

/// Sink that rejects every alert
pub struct FailingSink;

#[async_trait]
impl AlertSink for FailingSink {
    async fn create(&self, _alert: NewAlertRecord) -> Result<AlertRecord> {
        Err(Error::Sink("sink unavailable".to_string()))
    }
}

/// Sink that rejects only its `fail_on`-th call (1-based) and records the rest
pub struct IntermittentSink {
    fail_on: usize,
    calls: AtomicUsize,
    inner: MemoryAlertSink,
}

impl IntermittentSink {
    pub fn new(fail_on: usize) -> Self {
        Self {
            fail_on,
            calls: AtomicUsize::new(0),
            inner: MemoryAlertSink::new(),
        }
    }

    pub async fn records(&self) -> Vec<AlertRecord> {
        self.inner.records().await
    }
}

#[async_trait]
impl AlertSink for IntermittentSink {
    async fn create(&self, alert: NewAlertRecord) -> Result<AlertRecord> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(Error::Sink(format!("rejected call {}", call)));
        }
        self.inner.create(alert).await
    }
}
