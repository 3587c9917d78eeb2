//! Input validation for expense records
//!
//! Runs before any statistics or rule evaluation so malformed input never
//! reaches the engine.

use crate::categorize::categorize;
use crate::error::{Error, Result};
use crate::models::{Category, Expense, NewExpense};

/// Validate a new expense and resolve its category
///
/// The category is the explicit one when given, otherwise it is derived from
/// the concept.
pub fn validate_new(expense: &NewExpense) -> Result<Category> {
    check_fields(&expense.concept, expense.amount)?;
    Ok(expense
        .category
        .unwrap_or_else(|| categorize(&expense.concept)))
}

/// Validate an existing (or fully built candidate) expense record
pub fn validate_expense(expense: &Expense) -> Result<()> {
    check_fields(&expense.concept, expense.amount)
}

fn check_fields(concept: &str, amount: i64) -> Result<()> {
    if concept.trim().is_empty() {
        return Err(Error::InvalidData("Expense concept is required".into()));
    }
    if amount <= 0 {
        return Err(Error::InvalidData(format!(
            "Expense amount must be positive (got {})",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    fn new_expense(concept: &str, amount: i64, category: Option<Category>) -> NewExpense {
        NewExpense {
            date: date(2024, 3, 1),
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

    #[test]
    fn test_explicit_category_kept() {
        let category = validate_new(&new_expense("Gasolina", 5_000, Some(Category::Other))).unwrap();
        assert_eq!(category, Category::Other);
    }

    #[test]
    fn test_missing_category_derived_from_concept() {
        let category = validate_new(&new_expense("Gasolina", 5_000, None)).unwrap();
        assert_eq!(category, Category::Transport);
    }

    #[test]
    fn test_blank_concept_rejected() {
        let result = validate_new(&new_expense("   ", 5_000, None));
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        assert!(matches!(
            validate_new(&new_expense("Gasolina", 0, None)),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            validate_new(&new_expense("Gasolina", -10, None)),
            Err(Error::InvalidData(_))
        ));
    }
}
