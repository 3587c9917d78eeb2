//! Integration tests for deduce-core
//!
//! These tests exercise the full import → check → trends → alert workflow.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use deduce_core::{
    import::parse_csv, summarize, AlertRule, Category, EngineConfig, ExpenseFilter, ExpenseMonitor,
    ExpenseRepository, ExpenseStatus, ExpenseUpdate, InMemoryExpenseRepository, MemoryAlertSink,
    NewExpense, Severity, TrendDirection, TrendWindow,
};

/// Five months of a personal trainer's expenses:
/// - Four equipment purchases (enough for a baseline, mean 125.00)
/// - Marketing jumping from 80.00 in April to 300.00 in May
/// - One non-deductible client dinner
fn trainer_csv() -> &'static str {
    "date,concept,amount,category,deductible,notes,attachments
2024-01-10,Mancuernas,100.00,equipamiento,si,,
2024-02-10,Bicicleta estática,150.00,equipamiento,si,,
2024-03-10,Cinta de correr,120.00,equipamiento,si,,
2024-04-10,Pesas rusas,130.00,equipamiento,si,,
2024-04-12,Publicidad Instagram,80.00,marketing,si,,
2024-05-12,Publicidad Instagram,300.00,marketing,si,,/uploads/ig-may.pdf
2024-05-14,Cena con cliente,45.00,dietas,no,Reunión,"
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
}

fn new_expense(date: NaiveDate, concept: &str, amount: i64, category: Option<Category>) -> NewExpense {
    NewExpense {
        date,
        concept: concept.to_string(),
        amount,
        category,
        vat_type: None,
        deductible: true,
        notes: None,
        attachments: Vec::new(),
        origin: None,
        created_by: None,
    }
}

fn monitor() -> ExpenseMonitor {
    let expenses = parse_csv(trainer_csv().as_bytes()).expect("Failed to parse CSV");
    let repository = InMemoryExpenseRepository::with_expenses(expenses);
    ExpenseMonitor::new(Arc::new(repository), EngineConfig::default())
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_import_and_summarize() {
    let expenses = parse_csv(trainer_csv().as_bytes()).expect("Failed to parse CSV");
    assert_eq!(expenses.len(), 7);
    assert_eq!(expenses[0].category, Category::Equipment);
    assert_eq!(expenses[6].category, Category::Meals);
    assert!(!expenses[6].deductible);
    assert_eq!(expenses[5].attachments.len(), 1);

    let summary = summarize(&expenses);
    assert_eq!(summary.count, 7);
    assert_eq!(summary.total, 92_500);
    assert_eq!(summary.deductible_total, 88_000);
    assert_eq!(summary.non_deductible_total, 4_500);
    assert_eq!(summary.categories[0].category, Category::Equipment);
}

// =============================================================================
// Candidate checks
// =============================================================================

#[tokio::test]
async fn test_excess_over_category_mean() {
    let monitor = monitor();
    let new = new_expense(
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
        "Rack de sentadillas",
        40_000,
        Some(Category::Equipment),
    );

    let check = monitor.check_new(&new, as_of()).await.unwrap();
    let alert = check.alert.expect("Expected an alert");

    assert_eq!(alert.rule, AlertRule::ExcessOverMean);
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.evidence.baseline, Some(12_500.0));
    assert_eq!(alert.evidence.ratio, Some(3.2));

    // Over the receipt threshold as well, reported but not selected
    assert!(check
        .findings
        .iter()
        .any(|f| f.rule == AlertRule::MissingReceipt));
}

#[tokio::test]
async fn test_non_deductible_category_outranks_other_findings() {
    let monitor = monitor();
    let new = new_expense(
        NaiveDate::from_ymd_opt(2024, 5, 22).unwrap(),
        "Comida con proveedor",
        30_000,
        Some(Category::Meals),
    );

    let check = monitor.check_new(&new, as_of()).await.unwrap();
    let alert = check.alert.unwrap();

    assert_eq!(alert.rule, AlertRule::DeductibleMismatch);
    assert_eq!(alert.severity, Severity::Error);
    assert_eq!(check.findings.len(), 2);
}

#[tokio::test]
async fn test_duplicate_within_recent_window() {
    let monitor = monitor();
    let mut new = new_expense(
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
        "publicidad instagram ",
        30_050,
        None,
    );
    new.attachments = vec![deduce_core::Attachment::reference("/uploads/ig-dup.pdf")];

    let check = monitor.check_new(&new, as_of()).await.unwrap();
    let alert = check.alert.unwrap();

    assert_eq!(alert.rule, AlertRule::Duplicate);
    assert_eq!(alert.expense.category, Category::Marketing);
    assert!(alert.evidence.matched_expense_id.is_some());
}

#[tokio::test]
async fn test_existing_expense_does_not_match_itself() {
    let expenses = parse_csv(trainer_csv().as_bytes()).unwrap();
    let existing = expenses[5].clone();
    let repository = InMemoryExpenseRepository::with_expenses(expenses);
    let monitor = ExpenseMonitor::new(Arc::new(repository), EngineConfig::default());

    let check = monitor.check_expense(existing, as_of()).await.unwrap();
    assert!(check.alert.is_none());
}

#[tokio::test]
async fn test_ordinary_expense_passes() {
    let monitor = monitor();
    let new = new_expense(
        NaiveDate::from_ymd_opt(2024, 5, 25).unwrap(),
        "Bandas elásticas",
        11_000,
        Some(Category::Equipment),
    );

    let check = monitor.check_new(&new, as_of()).await.unwrap();
    assert!(check.alert.is_none());
    assert!(check.findings.is_empty());
    assert_eq!(check.baseline_categories, 1);
}

// =============================================================================
// Trends and category exceptions
// =============================================================================

#[tokio::test]
async fn test_trend_report() {
    let monitor = monitor();
    let report = monitor
        .trends(TrendWindow::Six, as_of())
        .await
        .applied()
        .expect("Refresh should apply");

    assert_eq!(report.months.len(), 6);

    let marketing = report
        .comparisons
        .iter()
        .find(|c| c.category == Category::Marketing)
        .unwrap();
    assert_eq!(marketing.total, 38_000);
    assert_eq!(marketing.direction, TrendDirection::Up);

    assert_eq!(report.exceptions.len(), 1);
    let exception = &report.exceptions[0];
    assert_eq!(exception.rule, AlertRule::CategoryException);
    assert_eq!(exception.expense.category, Category::Marketing);
}

#[tokio::test]
async fn test_poll_publishes_each_exception_once() {
    let monitor = monitor();
    let sink = MemoryAlertSink::new();
    let mut seen = HashSet::new();

    let first = monitor.poll_once(&sink, as_of(), &mut seen).await;
    assert_eq!(first.published, 1);
    assert_eq!(first.failed, 0);

    let second = monitor.poll_once(&sink, as_of(), &mut seen).await;
    assert_eq!(second.published, 0);

    let records = sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record.alert_type, "category_exception");
    assert_eq!(
        records[0].record.action_url.as_deref(),
        Some("/expenses?category=marketing")
    );
    assert_eq!(records[0].record.role, "owner");
    assert!(!records[0].read);
}

// =============================================================================
// Repository lifecycle
// =============================================================================

#[tokio::test]
async fn test_expense_lifecycle() {
    let repository = InMemoryExpenseRepository::new();

    let created = repository
        .create(new_expense(
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            "Curso de nutrición deportiva",
            18_000,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(created.category, Category::Training);
    assert_eq!(created.status, ExpenseStatus::PendingReview);

    let validated = repository
        .validate(&created.id, ExpenseStatus::Approved, Some("Factura correcta"))
        .await
        .unwrap();
    assert_eq!(validated.status, ExpenseStatus::Approved);
    assert!(validated.notes.unwrap().contains("Factura correcta"));

    let updated = repository
        .update(
            &created.id,
            ExpenseUpdate {
                amount: Some(20_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, 20_000);

    let found = repository
        .query(&ExpenseFilter::default().with_category(Category::Training))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    repository.delete(&created.id).await.unwrap();
    assert!(repository.query_by_id(&created.id).await.unwrap().is_none());
    assert!(repository.delete(&created.id).await.is_err());
}
