//! Alert delivery
//!
//! Engine alerts are converted into [`NewAlertRecord`]s and handed to an
//! [`AlertSink`], which persists or displays them. Two sinks ship with the
//! crate: an in-memory one (tests, CLI `--json` output) and one that writes
//! each alert to the log.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{Alert, ExpenseOrigin, Severity};

/// Priority of a delivered alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<Severity> for AlertPriority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::High,
            Severity::Warning => Self::Medium,
            Severity::Info => Self::Low,
        }
    }
}

/// Alert as submitted to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlertRecord {
    pub alert_type: String,
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    /// Role that should see the alert
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity_type: Option<String>,
}

/// Alert as stored by a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: NewAlertRecord,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Convert into a sink record addressed to `role`
    ///
    /// Category exceptions point at the category; everything else points at
    /// the expense that triggered the alert.
    pub fn to_record(&self, role: &str) -> NewAlertRecord {
        let (action_url, entity_id, entity_type) = match self.expense.origin {
            ExpenseOrigin::Aggregate => (
                format!("/expenses?category={}", self.expense.category.as_str()),
                self.expense.category.as_str().to_string(),
                "category",
            ),
            _ => (
                format!("/expenses/{}", self.expense.id),
                self.expense.id.clone(),
                "expense",
            ),
        };

        NewAlertRecord {
            alert_type: self.rule.as_str().to_string(),
            title: self.title().to_string(),
            message: self.message.clone(),
            priority: self.severity.into(),
            role: role.to_string(),
            action_url: Some(action_url),
            related_entity_id: Some(entity_id),
            related_entity_type: Some(entity_type.to_string()),
        }
    }
}

/// Destination for engine alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn create(&self, alert: NewAlertRecord) -> Result<AlertRecord>;
}

/// Sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    records: Mutex<Vec<AlertRecord>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records, oldest first
    pub async fn records(&self) -> Vec<AlertRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn create(&self, alert: NewAlertRecord) -> Result<AlertRecord> {
        let mut records = self.records.lock().await;
        let record = AlertRecord {
            id: format!("alert-record-{}", records.len() + 1),
            record: alert,
            read: false,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }
}

/// Sink that writes each alert to the log
#[derive(Debug, Default)]
pub struct LogAlertSink {
    sequence: AtomicU64,
}

impl LogAlertSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn create(&self, alert: NewAlertRecord) -> Result<AlertRecord> {
        match alert.priority {
            AlertPriority::High | AlertPriority::Medium => warn!(
                alert_type = %alert.alert_type,
                priority = alert.priority.as_str(),
                entity = alert.related_entity_id.as_deref().unwrap_or("-"),
                "{}: {}",
                alert.title,
                alert.message
            ),
            AlertPriority::Low => info!(
                alert_type = %alert.alert_type,
                priority = alert.priority.as_str(),
                entity = alert.related_entity_id.as_deref().unwrap_or("-"),
                "{}: {}",
                alert.title,
                alert.message
            ),
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(AlertRecord {
            id: format!("log-{}", sequence),
            record: alert,
            read: false,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertEvidence, AlertRule, Category};
    use crate::test_utils::{date, expense};

    fn alert(severity: Severity) -> Alert {
        Alert::new(
            AlertRule::MissingReceipt,
            severity,
            expense("exp-1", date(2024, 3, 1), "Curso", 30_000, Category::Training),
            "No receipt".to_string(),
            AlertEvidence::default(),
        )
    }

    #[test]
    fn test_priority_follows_severity() {
        assert_eq!(AlertPriority::from(Severity::Error), AlertPriority::High);
        assert_eq!(AlertPriority::from(Severity::Warning), AlertPriority::Medium);
        assert_eq!(AlertPriority::from(Severity::Info), AlertPriority::Low);
    }

    #[test]
    fn test_expense_alert_record() {
        let record = alert(Severity::Info).to_record("owner");

        assert_eq!(record.alert_type, "missing_receipt");
        assert_eq!(record.title, "Missing Receipt");
        assert_eq!(record.priority, AlertPriority::Low);
        assert_eq!(record.role, "owner");
        assert_eq!(record.action_url.as_deref(), Some("/expenses/exp-1"));
        assert_eq!(record.related_entity_id.as_deref(), Some("exp-1"));
        assert_eq!(record.related_entity_type.as_deref(), Some("expense"));
    }

    #[test]
    fn test_aggregate_alert_points_at_category() {
        let mut aggregate = expense("aggregate:marketing:2024-03", date(2024, 3, 1), "x", 1, Category::Marketing);
        aggregate.origin = ExpenseOrigin::Aggregate;
        let alert = Alert::new(
            AlertRule::CategoryException,
            Severity::Warning,
            aggregate,
            "Spike".to_string(),
            AlertEvidence::default(),
        );

        let record = alert.to_record("owner");
        assert_eq!(record.related_entity_type.as_deref(), Some("category"));
        assert_eq!(record.related_entity_id.as_deref(), Some("marketing"));
        assert_eq!(record.action_url.as_deref(), Some("/expenses?category=marketing"));
    }

    #[tokio::test]
    async fn test_memory_sink_stores_records() {
        let sink = MemoryAlertSink::new();
        let first = sink.create(alert(Severity::Error).to_record("owner")).await.unwrap();
        sink.create(alert(Severity::Info).to_record("owner")).await.unwrap();

        assert_eq!(first.id, "alert-record-1");
        assert!(!first.read);

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.priority, AlertPriority::High);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_records() {
        let record = LogAlertSink::new()
            .create(alert(Severity::Warning).to_record("owner"))
            .await
            .unwrap();
        assert_eq!(record.record.priority, AlertPriority::Medium);
    }

    #[tokio::test]
    async fn test_log_sink_ids_are_unique_within_a_burst() {
        let sink = LogAlertSink::new();
        let first = sink.create(alert(Severity::Info).to_record("owner")).await.unwrap();
        let second = sink.create(alert(Severity::Info).to_record("owner")).await.unwrap();

        assert_eq!(first.id, "log-1");
        assert_eq!(second.id, "log-2");
    }
}
