//! Expense file import
//!
//! Loads expense snapshots from CSV or JSON files for the CLI.
//!
//! CSV files use the header
//! `date,concept,amount,category,deductible,notes,attachments`; only the
//! first three columns are required. Amounts are decimal major units
//! (`1234.56`, `1.234,56` and `€ 75` all work) and are converted to minor
//! units without going through floating point. Attachments are a
//! `;`-separated list of references.
//!
//! JSON files contain an array of serialized expenses.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::categorize::{categorize, vat_type_for};
use crate::error::{Error, Result};
use crate::models::{Attachment, Category, Expense, ExpenseOrigin, ExpenseStatus};
use crate::validation::validate_expense;

/// User recorded as creator of imported expenses
const IMPORT_USER: &str = "import";

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    concept: String,
    amount: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    deductible: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    attachments: Option<String>,
}

/// Load expenses from a `.csv` or `.json` file
pub fn load_file(path: &Path) -> Result<Vec<Expense>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let file = File::open(path)?;
    let expenses = match extension.as_deref() {
        Some("csv") => parse_csv(file)?,
        Some("json") => load_json(file)?,
        _ => {
            return Err(Error::Import(format!(
                "Unsupported file type: {} (expected .csv or .json)",
                path.display()
            )))
        }
    };

    debug!(path = %path.display(), count = expenses.len(), "Loaded expenses");
    Ok(expenses)
}

/// Parse a JSON array of expenses
pub fn load_json<R: Read>(reader: R) -> Result<Vec<Expense>> {
    let expenses: Vec<Expense> = serde_json::from_reader(reader)?;
    for expense in &expenses {
        validate_expense(expense)
            .map_err(|e| Error::Import(format!("Expense {}: {}", expense.id, e)))?;
    }
    Ok(expenses)
}

/// Parse expenses from CSV
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Expense>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let now = Utc::now();
    let mut expenses = Vec::new();

    for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let row_number = index + 1;
        let row = result?;
        let context = |msg: String| Error::Import(format!("Row {}: {}", row_number, msg));

        let date = parse_date(&row.date).map_err(|e| row_error(row_number, e))?;
        let amount = parse_amount(&row.amount).map_err(|e| row_error(row_number, e))?;

        let category = match row.category.as_deref().filter(|c| !c.is_empty()) {
            Some(raw) => raw.parse::<Category>().map_err(context)?,
            None => categorize(&row.concept),
        };
        let deductible = match row.deductible.as_deref() {
            Some(raw) => parse_bool(raw).ok_or_else(|| context(format!("Invalid deductible flag: {}", raw)))?,
            None => true,
        };
        let attachments = row
            .attachments
            .as_deref()
            .map(|list| {
                list.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Attachment::reference)
                    .collect()
            })
            .unwrap_or_default();

        let expense = Expense {
            id: import_id(&date, &row.concept, amount, row_number),
            date,
            vat_type: vat_type_for(category, &row.concept),
            concept: row.concept,
            amount,
            category,
            deductible,
            status: ExpenseStatus::PendingReview,
            origin: ExpenseOrigin::Bank,
            notes: row.notes.filter(|n| !n.is_empty()),
            attachments,
            created_at: now,
            updated_at: now,
            created_by: IMPORT_USER.to_string(),
        };
        validate_expense(&expense).map_err(|e| row_error(row_number, e))?;
        expenses.push(expense);
    }

    debug!("Parsed {} CSV expenses", expenses.len());
    Ok(expenses)
}

fn row_error(row: usize, err: Error) -> Error {
    match err {
        Error::Import(msg) | Error::InvalidData(msg) => {
            Error::Import(format!("Row {}: {}", row, msg))
        }
        other => other,
    }
}

/// Stable id from the row contents and position
fn import_id(date: &NaiveDate, concept: &str, amount: i64, row: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(concept.as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(row.to_be_bytes());
    format!("imp-{}", &hex::encode(hasher.finalize())[..16])
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%d/%m/%Y", // 15/01/2024
        "%d-%m-%Y", // 15-01-2024
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse a decimal major-unit amount into minor units
///
/// When both `.` and `,` appear, the last one is the decimal separator. A
/// lone separator followed by one or two digits is decimal, otherwise it
/// groups thousands.
pub fn parse_amount(s: &str) -> Result<i64> {
    let invalid = || Error::Import(format!("Unable to parse amount: {}", s));

    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('-') {
        return Err(invalid());
    }

    let decimal_pos = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(pos), None) | (None, Some(pos)) => {
            let digits_after = cleaned.len() - pos - 1;
            let single = cleaned.matches(['.', ',']).count() == 1;
            (single && (1..=2).contains(&digits_after)).then_some(pos)
        }
        (None, None) => None,
    };

    let (whole, fraction) = match decimal_pos {
        Some(pos) => (&cleaned[..pos], &cleaned[pos + 1..]),
        None => (cleaned.as_str(), ""),
    };

    let whole: String = whole.chars().filter(|c| !matches!(c, '.' | ',')).collect();
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > 2 {
        return Err(invalid());
    }

    let major: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let minor: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    major
        .checked_mul(100)
        .and_then(|m| m.checked_add(minor))
        .ok_or_else(invalid)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "" | "true" | "yes" | "y" | "1" | "si" | "sí" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1234.56").unwrap(), 123_456);
        assert_eq!(parse_amount("1.234,56").unwrap(), 123_456);
        assert_eq!(parse_amount("1,234.56").unwrap(), 123_456);
        assert_eq!(parse_amount("€ 75").unwrap(), 7_500);
        assert_eq!(parse_amount("75,5").unwrap(), 7_550);
        assert_eq!(parse_amount("1.500").unwrap(), 150_000);
        assert_eq!(parse_amount("0.05").unwrap(), 5);
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("-10").is_err());
        assert!(parse_amount("1.2.3,456").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15").unwrap(), expected);
        assert_eq!(parse_date("15/01/2024").unwrap(), expected);
        assert!(parse_date("January 15").is_err());
    }

    #[test]
    fn test_parse_csv() {
        let data = "\
date,concept,amount,category,deductible,notes,attachments
2024-01-15,Mancuernas 10kg,120.50,,,,
2024-01-20,Cena con cliente,45,dietas,no,Reunión trimestral,
2024-02-01,Curso NASM,300,formacion,si,,/uploads/nasm.pdf; /uploads/nasm-2.pdf
";

        let expenses = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(expenses.len(), 3);

        let first = &expenses[0];
        assert_eq!(first.amount, 12_050);
        assert_eq!(first.category, Category::Equipment);
        assert!(first.deductible);
        assert!(first.id.starts_with("imp-"));
        assert!(first.attachments.is_empty());

        let second = &expenses[1];
        assert_eq!(second.category, Category::Meals);
        assert!(!second.deductible);
        assert_eq!(second.notes.as_deref(), Some("Reunión trimestral"));

        let third = &expenses[2];
        assert_eq!(third.category, Category::Training);
        assert_eq!(third.attachments.len(), 2);
        assert_eq!(third.attachments[1].file_name, "nasm-2.pdf");
    }

    #[test]
    fn test_parse_csv_minimal_columns() {
        let data = "date,concept,amount\n2024-03-01,Gasolina,60\n";
        let expenses = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(expenses[0].category, Category::Transport);
        assert!(expenses[0].deductible);
    }

    #[test]
    fn test_identical_rows_get_distinct_ids() {
        let data = "date,concept,amount\n2024-03-01,Gasolina,60\n2024-03-01,Gasolina,60\n";
        let expenses = parse_csv(data.as_bytes()).unwrap();
        assert_ne!(expenses[0].id, expenses[1].id);
    }

    #[test]
    fn test_parse_csv_reports_row() {
        let data = "date,concept,amount\n2024-03-01,Gasolina,60\n2024-03-02,Taxi,abc\n";
        let err = parse_csv(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Row 2"));
    }

    #[test]
    fn test_parse_csv_unknown_category() {
        let data = "date,concept,amount,category\n2024-03-01,Gasolina,60,groceries\n";
        assert!(matches!(parse_csv(data.as_bytes()), Err(Error::Import(_))));
    }

    #[test]
    fn test_load_json_round_trip() {
        let data = "date,concept,amount\n2024-03-01,Gasolina,60\n";
        let expenses = parse_csv(data.as_bytes()).unwrap();
        let json = serde_json::to_string(&expenses).unwrap();

        let loaded = load_json(json.as_bytes()).unwrap();
        assert_eq!(loaded, expenses);
    }

    #[test]
    fn test_load_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("expenses.csv");
        std::fs::write(&csv_path, "date,concept,amount\n2024-03-01,Gasolina,60\n").unwrap();
        assert_eq!(load_file(&csv_path).unwrap().len(), 1);

        let txt_path = dir.path().join("expenses.txt");
        std::fs::write(&txt_path, "").unwrap();
        assert!(matches!(load_file(&txt_path), Err(Error::Import(_))));
    }
}
