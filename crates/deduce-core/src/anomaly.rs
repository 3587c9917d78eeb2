//! Per-expense anomaly detection
//!
//! Evaluates a candidate expense (saved or not) against:
//! - Excess over mean: amount far above the category baseline
//! - Deductible mismatch: marked deductible but looks personal or punitive
//! - Missing receipt: large amount with nothing attached
//! - Duplicate: same concept and amount recorded a few days apart
//!
//! Rules run independently in that order. When several fire, the most severe
//! wins and ties go to the rule evaluated first, so an excess warning
//! outranks a duplicate warning. The detector never persists anything.

use tracing::debug;

use crate::config::AnomalyConfig;
use crate::models::{format_minor, Alert, AlertEvidence, AlertRule, Expense, Severity};
use crate::statistics::StatisticsMap;

/// Runs the per-expense review rules
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    /// Lowercased once so matching stays case-insensitive
    red_flag_terms: Vec<String>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::with_config(AnomalyConfig::default())
    }

    pub fn with_config(config: AnomalyConfig) -> Self {
        let red_flag_terms = config
            .red_flag_terms
            .iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            config,
            red_flag_terms,
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Evaluate a candidate and return the single alert to surface, if any
    pub fn evaluate(
        &self,
        candidate: &Expense,
        stats: &StatisticsMap,
        recent: &[Expense],
    ) -> Option<Alert> {
        let selected = select_most_severe(self.findings(candidate, stats, recent));
        if let Some(alert) = &selected {
            debug!(
                expense = %candidate.id,
                rule = alert.rule.as_str(),
                severity = alert.severity.as_str(),
                "Candidate expense flagged"
            );
        }
        selected
    }

    /// Every alert that fires for the candidate, in rule evaluation order
    pub fn findings(
        &self,
        candidate: &Expense,
        stats: &StatisticsMap,
        recent: &[Expense],
    ) -> Vec<Alert> {
        [
            self.check_excess_over_mean(candidate, stats),
            self.check_deductible_mismatch(candidate),
            self.check_missing_receipt(candidate),
            self.check_duplicate(candidate, recent),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn check_excess_over_mean(&self, candidate: &Expense, stats: &StatisticsMap) -> Option<Alert> {
        let baseline = stats.get(&candidate.category)?;
        if baseline.mean <= 0.0 {
            return None;
        }

        let amount = candidate.amount as f64;
        let ratio = amount / baseline.mean;
        if ratio < self.config.excess_ratio {
            return None;
        }

        let percent_over = ((ratio - 1.0) * 100.0).round() as i64;
        let difference = amount - baseline.mean;
        let message = format!(
            "{} is {}% above your average {} expense ({} over a mean of {}, {} samples)",
            format_minor(amount),
            percent_over,
            candidate.category.label().to_lowercase(),
            format_minor(difference),
            format_minor(baseline.mean),
            baseline.count
        );

        Some(Alert::new(
            AlertRule::ExcessOverMean,
            Severity::Warning,
            candidate.clone(),
            message,
            AlertEvidence {
                ratio: Some(ratio),
                difference: Some(difference),
                baseline: Some(baseline.mean),
                ..Default::default()
            },
        ))
    }

    fn check_deductible_mismatch(&self, candidate: &Expense) -> Option<Alert> {
        if !candidate.deductible {
            return None;
        }

        let message = if self
            .config
            .non_deductible_categories
            .contains(&candidate.category)
        {
            format!(
                "{} expenses are usually not deductible. Check before marking \"{}\" as deductible.",
                candidate.category.label(),
                candidate.concept
            )
        } else {
            let concept = candidate.concept.to_lowercase();
            let term = self
                .red_flag_terms
                .iter()
                .find(|term| concept.contains(term.as_str()))?;
            format!(
                "\"{}\" mentions \"{}\", which is usually not deductible.",
                candidate.concept, term
            )
        };

        Some(Alert::new(
            AlertRule::DeductibleMismatch,
            Severity::Error,
            candidate.clone(),
            message,
            AlertEvidence::default(),
        ))
    }

    fn check_missing_receipt(&self, candidate: &Expense) -> Option<Alert> {
        if !candidate.attachments.is_empty() || candidate.amount <= self.config.receipt_threshold {
            return None;
        }

        Some(Alert::new(
            AlertRule::MissingReceipt,
            Severity::Info,
            candidate.clone(),
            format!(
                "No receipt attached to an expense of {}. Attach the invoice to support the deduction.",
                format_minor(candidate.amount as f64)
            ),
            AlertEvidence {
                baseline: Some(self.config.receipt_threshold as f64),
                ..Default::default()
            },
        ))
    }

    fn check_duplicate(&self, candidate: &Expense, recent: &[Expense]) -> Option<Alert> {
        let concept = normalize_concept(&candidate.concept);
        let other = recent.iter().find(|other| {
            other.id != candidate.id
                && normalize_concept(&other.concept) == concept
                && (other.amount - candidate.amount).abs() < self.config.duplicate_amount_tolerance
                && (other.date - candidate.date).num_days().abs()
                    <= self.config.duplicate_window_days
        })?;

        let days_apart = (other.date - candidate.date).num_days().abs();
        Some(Alert::new(
            AlertRule::Duplicate,
            Severity::Warning,
            candidate.clone(),
            format!(
                "\"{}\" for {} was already recorded on {} ({} days apart).",
                other.concept,
                format_minor(other.amount as f64),
                other.date,
                days_apart
            ),
            AlertEvidence {
                difference: Some((candidate.amount - other.amount) as f64),
                matched_expense_id: Some(other.id.clone()),
                ..Default::default()
            },
        ))
    }
}

/// Pick the most severe alert; the earliest wins among equals
pub fn select_most_severe(findings: Vec<Alert>) -> Option<Alert> {
    findings.into_iter().fold(None, |best, alert| match best {
        Some(best) if best.severity >= alert.severity => Some(best),
        _ => Some(alert),
    })
}

/// Concept form used for duplicate matching
fn normalize_concept(concept: &str) -> String {
    concept.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::statistics::{StatisticsEngine, StatsWindow};
    use crate::test_utils::{date, expense, ExpenseBuilder};

    fn equipment_baseline() -> StatisticsMap {
        let history = vec![
            expense("h1", date(2024, 1, 10), "Pesas", 100, Category::Equipment),
            expense("h2", date(2024, 2, 10), "Mancuernas", 150, Category::Equipment),
            expense("h3", date(2024, 3, 10), "Cinta", 120, Category::Equipment),
            expense("h4", date(2024, 4, 10), "Bicicleta", 130, Category::Equipment),
        ];
        StatisticsEngine::new().compute(
            &history,
            StatsWindow::trailing_months(date(2024, 6, 1), 12),
        )
    }

    fn baseline_with_mean(mean_amount: i64) -> StatisticsMap {
        let history: Vec<Expense> = (0..3)
            .map(|i| {
                expense(
                    &format!("m{}", i),
                    date(2024, 1 + i, 5),
                    "Licencia",
                    mean_amount,
                    Category::Software,
                )
            })
            .collect();
        StatisticsEngine::new().compute(
            &history,
            StatsWindow::trailing_months(date(2024, 6, 1), 12),
        )
    }

    #[test]
    fn test_excess_over_mean_fires_at_160_percent() {
        let stats = equipment_baseline();
        let candidate = expense("new", date(2024, 5, 2), "Rack", 200, Category::Equipment);

        let alert = AnomalyDetector::new()
            .evaluate(&candidate, &stats, &[])
            .expect("alert expected");

        assert_eq!(alert.rule, AlertRule::ExcessOverMean);
        assert_eq!(alert.severity, Severity::Warning);
        assert!((alert.evidence.ratio.unwrap() - 1.6).abs() < 1e-12);
        assert_eq!(alert.evidence.difference, Some(75.0));
        assert_eq!(alert.evidence.baseline, Some(125.0));
        assert!(alert.message.contains("60%"), "message: {}", alert.message);
        assert!(alert.message.contains("0.75"), "message: {}", alert.message);
    }

    #[test]
    fn test_excess_boundary_is_inclusive() {
        let stats = baseline_with_mean(1_000_000);
        let detector = AnomalyDetector::new();

        let at_threshold = expense("c1", date(2024, 5, 2), "x", 1_500_000, Category::Software);
        let finding = detector
            .findings(&at_threshold, &stats, &[])
            .into_iter()
            .find(|a| a.rule == AlertRule::ExcessOverMean);
        assert!(finding.is_some());

        let just_below = expense("c2", date(2024, 5, 2), "x", 1_499_999, Category::Software);
        let finding = detector
            .findings(&just_below, &stats, &[])
            .into_iter()
            .find(|a| a.rule == AlertRule::ExcessOverMean);
        assert!(finding.is_none());
    }

    #[test]
    fn test_excess_requires_statistics() {
        let candidate = expense("new", date(2024, 5, 2), "Rack", 200, Category::Equipment);
        let alert = AnomalyDetector::new().evaluate(&candidate, &StatisticsMap::new(), &[]);
        assert!(alert.is_none());
    }

    #[test]
    fn test_mismatch_outranks_excess() {
        let stats = equipment_baseline();
        let candidate = expense(
            "new",
            date(2024, 5, 2),
            "Multa de tráfico equipo",
            200,
            Category::Equipment,
        );

        let detector = AnomalyDetector::new();
        let findings = detector.findings(&candidate, &stats, &[]);
        assert_eq!(findings.len(), 2);

        let alert = detector.evaluate(&candidate, &stats, &[]).unwrap();
        assert_eq!(alert.rule, AlertRule::DeductibleMismatch);
        assert_eq!(alert.severity, Severity::Error);
        assert!(alert.message.contains("multa"));
    }

    #[test]
    fn test_mismatch_without_history() {
        let candidate = expense(
            "new",
            date(2024, 5, 2),
            "SANCIÓN administrativa",
            50,
            Category::Other,
        );
        let alert = AnomalyDetector::new()
            .evaluate(&candidate, &StatisticsMap::new(), &[])
            .unwrap();
        assert_eq!(alert.rule, AlertRule::DeductibleMismatch);
    }

    #[test]
    fn test_mismatch_on_non_deductible_category() {
        let candidate = expense("new", date(2024, 5, 2), "Almuerzo", 50, Category::Meals);
        let alert = AnomalyDetector::new()
            .evaluate(&candidate, &StatisticsMap::new(), &[])
            .unwrap();
        assert_eq!(alert.rule, AlertRule::DeductibleMismatch);
        assert!(alert.message.contains("Meals"));
    }

    #[test]
    fn test_mismatch_ignored_when_not_deductible() {
        let candidate = ExpenseBuilder::new("new")
            .concept("Multa de aparcamiento")
            .amount(50)
            .category(Category::Transport)
            .deductible(false)
            .build();
        let alert = AnomalyDetector::new().evaluate(&candidate, &StatisticsMap::new(), &[]);
        assert!(alert.is_none());
    }

    #[test]
    fn test_missing_receipt_is_info() {
        let candidate = expense("new", date(2024, 5, 2), "Curso NASM", 30_000, Category::Training);
        let alert = AnomalyDetector::new()
            .evaluate(&candidate, &StatisticsMap::new(), &[])
            .unwrap();
        assert_eq!(alert.rule, AlertRule::MissingReceipt);
        assert_eq!(alert.severity, Severity::Info);

        let with_receipt = ExpenseBuilder::new("new2")
            .concept("Curso NASM")
            .amount(30_000)
            .category(Category::Training)
            .attachment("/uploads/expenses/curso.pdf")
            .build();
        assert!(AnomalyDetector::new()
            .evaluate(&with_receipt, &StatisticsMap::new(), &[])
            .is_none());
    }

    #[test]
    fn test_missing_receipt_threshold_is_exclusive() {
        let candidate = expense("new", date(2024, 5, 2), "Curso", 25_000, Category::Training);
        assert!(AnomalyDetector::new()
            .evaluate(&candidate, &StatisticsMap::new(), &[])
            .is_none());
    }

    #[test]
    fn test_duplicate_within_window() {
        let existing = expense("old", date(2024, 5, 1), "Publicidad Instagram", 5_000, Category::Marketing);
        let candidate = expense("new", date(2024, 5, 6), "  publicidad instagram ", 5_050, Category::Marketing);

        let alert = AnomalyDetector::new()
            .evaluate(&candidate, &StatisticsMap::new(), &[existing])
            .unwrap();
        assert_eq!(alert.rule, AlertRule::Duplicate);
        assert_eq!(alert.evidence.matched_expense_id.as_deref(), Some("old"));
        assert!(alert.message.contains("5 days apart"));
    }

    #[test]
    fn test_duplicate_outside_window() {
        let existing = expense("old", date(2024, 5, 1), "Publicidad Instagram", 5_000, Category::Marketing);
        let candidate = expense("new", date(2024, 5, 11), "Publicidad Instagram", 5_000, Category::Marketing);

        let alert = AnomalyDetector::new().evaluate(&candidate, &StatisticsMap::new(), &[existing]);
        assert!(alert.is_none());
    }

    #[test]
    fn test_duplicate_window_boundary_is_inclusive() {
        let detector = AnomalyDetector::new();
        let existing = expense("old", date(2024, 5, 1), "Hosting", 2_000, Category::Software);

        let seven_days = expense("new7", date(2024, 5, 8), "Hosting", 2_000, Category::Software);
        let alert = detector
            .evaluate(&seven_days, &StatisticsMap::new(), std::slice::from_ref(&existing))
            .expect("duplicate expected at 7 days");
        assert_eq!(alert.rule, AlertRule::Duplicate);
        assert!(alert.message.contains("7 days apart"));

        let eight_days = expense("new8", date(2024, 5, 9), "Hosting", 2_000, Category::Software);
        assert!(detector
            .evaluate(&eight_days, &StatisticsMap::new(), &[existing])
            .is_none());
    }

    #[test]
    fn test_duplicate_ignores_same_id_and_distant_amounts() {
        let detector = AnomalyDetector::new();
        let candidate = expense("same", date(2024, 5, 2), "Hosting", 2_000, Category::Software);

        let itself = candidate.clone();
        assert!(detector
            .evaluate(&candidate, &StatisticsMap::new(), &[itself])
            .is_none());

        let different_amount = expense("other", date(2024, 5, 2), "Hosting", 2_100, Category::Software);
        assert!(detector
            .evaluate(&candidate, &StatisticsMap::new(), &[different_amount])
            .is_none());
    }

    #[test]
    fn test_excess_wins_tie_against_duplicate() {
        let stats = equipment_baseline();
        let existing = expense("old", date(2024, 5, 1), "Rack", 200, Category::Equipment);
        let candidate = expense("new", date(2024, 5, 2), "Rack", 200, Category::Equipment);

        let detector = AnomalyDetector::new();
        let findings = detector.findings(&candidate, &stats, std::slice::from_ref(&existing));
        let rules: Vec<_> = findings.iter().map(|a| a.rule).collect();
        assert_eq!(rules, vec![AlertRule::ExcessOverMean, AlertRule::Duplicate]);

        let alert = detector.evaluate(&candidate, &stats, &[existing]).unwrap();
        assert_eq!(alert.rule, AlertRule::ExcessOverMean);
    }

    #[test]
    fn test_warning_outranks_info() {
        let existing = expense("old", date(2024, 5, 1), "Portátil", 90_000, Category::Equipment);
        let candidate = expense("new", date(2024, 5, 2), "Portátil", 90_000, Category::Equipment);

        let alert = AnomalyDetector::new()
            .evaluate(&candidate, &StatisticsMap::new(), &[existing])
            .unwrap();
        assert_eq!(alert.rule, AlertRule::Duplicate);
    }

    #[test]
    fn test_unsaved_candidates_with_different_concepts_get_distinct_ids() {
        let detector = AnomalyDetector::new();
        let course = expense("candidate", date(2024, 5, 2), "Curso NASM", 30_000, Category::Training);
        let seminar = expense("candidate", date(2024, 5, 2), "Seminario ACE", 30_000, Category::Training);

        let first = detector.evaluate(&course, &StatisticsMap::new(), &[]).unwrap();
        let second = detector.evaluate(&seminar, &StatisticsMap::new(), &[]).unwrap();
        assert_eq!(first.rule, AlertRule::MissingReceipt);
        assert_eq!(second.rule, AlertRule::MissingReceipt);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_alert_ids_are_stable() {
        let stats = equipment_baseline();
        let candidate = expense("new", date(2024, 5, 2), "Rack", 200, Category::Equipment);
        let detector = AnomalyDetector::new();

        let first = detector.evaluate(&candidate, &stats, &[]).unwrap();
        let second = detector.evaluate(&candidate, &stats, &[]).unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.id.starts_with("alert-"));
    }
}
