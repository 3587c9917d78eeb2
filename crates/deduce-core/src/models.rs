//! Domain models for Deduce

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Expense categories
///
/// Parsing accepts both the English keys and the Spanish keys used by the
/// dashboard that produces the expense records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Equipment,
    Certifications,
    Marketing,
    Transport,
    Supplies,
    Software,
    Insurance,
    Rent,
    ProfessionalServices,
    Training,
    Communications,
    Meals,
    Clothing,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Certifications => "certifications",
            Self::Marketing => "marketing",
            Self::Transport => "transport",
            Self::Supplies => "supplies",
            Self::Software => "software",
            Self::Insurance => "insurance",
            Self::Rent => "rent",
            Self::ProfessionalServices => "professional_services",
            Self::Training => "training",
            Self::Communications => "communications",
            Self::Meals => "meals",
            Self::Clothing => "clothing",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Equipment => "Equipment",
            Self::Certifications => "Certifications",
            Self::Marketing => "Marketing",
            Self::Transport => "Transport",
            Self::Supplies => "Supplies",
            Self::Software => "Software",
            Self::Insurance => "Insurance",
            Self::Rent => "Rent",
            Self::ProfessionalServices => "Professional Services",
            Self::Training => "Training",
            Self::Communications => "Communications",
            Self::Meals => "Meals",
            Self::Clothing => "Clothing",
            Self::Other => "Other",
        }
    }

    /// All categories in keyword-priority order
    pub fn all() -> &'static [Category] {
        &[
            Self::Equipment,
            Self::Certifications,
            Self::Marketing,
            Self::Transport,
            Self::Supplies,
            Self::Software,
            Self::Insurance,
            Self::Rent,
            Self::ProfessionalServices,
            Self::Training,
            Self::Communications,
            Self::Meals,
            Self::Clothing,
            Self::Other,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equipment" | "equipamiento" => Ok(Self::Equipment),
            "certifications" | "certificaciones" => Ok(Self::Certifications),
            "marketing" => Ok(Self::Marketing),
            "transport" | "transporte" => Ok(Self::Transport),
            "supplies" | "materiales" => Ok(Self::Supplies),
            "software" => Ok(Self::Software),
            "insurance" | "seguros" => Ok(Self::Insurance),
            "rent" | "alquiler" => Ok(Self::Rent),
            "professional_services" | "servicios_profesionales" => {
                Ok(Self::ProfessionalServices)
            }
            "training" | "formacion" | "formación" => Ok(Self::Training),
            "communications" | "comunicaciones" => Ok(Self::Communications),
            "meals" | "dietas" => Ok(Self::Meals),
            "clothing" | "vestimenta" => Ok(Self::Clothing),
            "other" | "otros" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// VAT treatment of an expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VatType {
    #[default]
    General,
    Reduced,
    SuperReduced,
    Exempt,
}

impl VatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Reduced => "reduced",
            Self::SuperReduced => "super_reduced",
            Self::Exempt => "exempt",
        }
    }
}

/// Review status of an expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    #[default]
    PendingReview,
    Approved,
    Rejected,
    NeedsInfo,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsInfo => "needs_info",
        }
    }
}

impl std::str::FromStr for ExpenseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending_review" | "pendiente_revision" => Ok(Self::PendingReview),
            "approved" | "aprobado" => Ok(Self::Approved),
            "rejected" | "rechazado" => Ok(Self::Rejected),
            "needs_info" | "requiere_info" => Ok(Self::NeedsInfo),
            _ => Err(format!("Unknown expense status: {}", s)),
        }
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expense origin - how it was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseOrigin {
    /// Entered by hand in the expense form
    #[default]
    Manual,
    /// Imported from a bank statement
    Bank,
    /// Created from a scanned receipt
    Receipt,
    /// Synthetic record representing a category-month total
    Aggregate,
}

impl ExpenseOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Bank => "bank",
            Self::Receipt => "receipt",
            Self::Aggregate => "aggregate",
        }
    }
}

/// A file attached to an expense (invoice, receipt photo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    /// Storage location of the file
    pub url: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// Reference to a stored file, with the file name taken from the URL
    pub fn reference(url: &str) -> Self {
        let file_name = url.rsplit('/').next().unwrap_or(url).to_string();
        Self {
            id: short_hash(url.as_bytes()),
            url: url.to_string(),
            file_name,
            content_type: None,
            size_bytes: None,
        }
    }
}

/// A recorded business expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub date: NaiveDate,
    pub concept: String,
    /// Amount in minor currency units (always positive)
    pub amount: i64,
    pub category: Category,
    #[serde(default)]
    pub vat_type: VatType,
    pub deductible: bool,
    #[serde(default)]
    pub status: ExpenseStatus,
    #[serde(default)]
    pub origin: ExpenseOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

impl Expense {
    /// Calendar month the expense belongs to
    pub fn month(&self) -> MonthKey {
        MonthKey::from_date(self.date)
    }
}

/// Request to create an expense (or a candidate checked before saving)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub date: NaiveDate,
    pub concept: String,
    /// Amount in minor currency units
    pub amount: i64,
    /// Auto-categorized from the concept when absent
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub vat_type: Option<VatType>,
    #[serde(default = "default_deductible")]
    pub deductible: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub origin: Option<ExpenseOrigin>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_deductible() -> bool {
    true
}

impl NewExpense {
    /// Build an unsaved expense record for rule evaluation
    pub fn to_candidate(&self, id: &str, category: Category, now: DateTime<Utc>) -> Expense {
        Expense {
            id: id.to_string(),
            date: self.date,
            concept: self.concept.clone(),
            amount: self.amount,
            category,
            vat_type: self.vat_type.unwrap_or_default(),
            deductible: self.deductible,
            status: ExpenseStatus::PendingReview,
            origin: self.origin.unwrap_or_default(),
            notes: self.notes.clone(),
            attachments: self.attachments.clone(),
            created_at: now,
            updated_at: now,
            created_by: self
                .created_by
                .clone()
                .unwrap_or_else(|| "current-user".to_string()),
        }
    }
}

/// Partial update of an existing expense
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    pub date: Option<NaiveDate>,
    pub concept: Option<String>,
    pub amount: Option<i64>,
    pub category: Option<Category>,
    pub vat_type: Option<VatType>,
    pub deductible: Option<bool>,
    pub status: Option<ExpenseStatus>,
    pub notes: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
}

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    /// 1-based month number
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The preceding calendar month
    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The following calendar month
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid month key: {}", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid year in month key: {}", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month in month key: {}", s))?;
        Self::new(year, month).ok_or_else(|| format!("Month out of range: {}", s))
    }
}

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational nudge, never blocks saving
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rules that can raise a review alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    /// Amount well above the category's historical mean
    ExcessOverMean,
    /// Marked deductible but looks non-deductible
    DeductibleMismatch,
    /// Large expense without an attached receipt
    MissingReceipt,
    /// Same concept and amount recorded within a few days
    Duplicate,
    /// Category total jumped month over month
    CategoryException,
}

impl AlertRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExcessOverMean => "excess_over_mean",
            Self::DeductibleMismatch => "deductible_mismatch",
            Self::MissingReceipt => "missing_receipt",
            Self::Duplicate => "duplicate",
            Self::CategoryException => "category_exception",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ExcessOverMean => "Unusually High Expense",
            Self::DeductibleMismatch => "Deductibility Check",
            Self::MissingReceipt => "Missing Receipt",
            Self::Duplicate => "Possible Duplicate",
            Self::CategoryException => "Category Spending Spike",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ExcessOverMean => "This expense is well above your usual spending in its category",
            Self::DeductibleMismatch => "This expense is marked deductible but usually is not",
            Self::MissingReceipt => "Expenses of this size should keep an invoice or receipt",
            Self::Duplicate => "A very similar expense was recorded a few days apart",
            Self::CategoryException => "Spending in this category jumped compared to last month",
        }
    }
}

impl std::fmt::Display for AlertRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Numbers that produced an alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertEvidence {
    /// Amount divided by the reference value (mean or prior month total)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    /// Amount minus the reference value, in minor units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_percent: Option<f64>,
    /// The reference value itself (category mean or prior month total)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    /// Other expense involved (duplicates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_expense_id: Option<String>,
}

/// A review alert produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable fingerprint of rule + expense
    pub id: String,
    pub rule: AlertRule,
    pub severity: Severity,
    /// Triggering expense, or a synthetic aggregate for category alerts
    pub expense: Expense,
    pub message: String,
    pub evidence: AlertEvidence,
}

impl Alert {
    pub fn new(
        rule: AlertRule,
        severity: Severity,
        expense: Expense,
        message: String,
        evidence: AlertEvidence,
    ) -> Self {
        Self {
            id: alert_fingerprint(rule, &expense),
            rule,
            severity,
            expense,
            message,
            evidence,
        }
    }

    pub fn title(&self) -> &'static str {
        self.rule.label()
    }
}

/// Deterministic alert id, so re-running the engine yields the same ids
fn alert_fingerprint(rule: AlertRule, expense: &Expense) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule.as_str().as_bytes());
    hasher.update(expense.id.as_bytes());
    hasher.update(expense.concept.as_bytes());
    hasher.update(expense.date.to_string().as_bytes());
    hasher.update(expense.amount.to_be_bytes());
    format!("alert-{}", &hex::encode(hasher.finalize())[..16])
}

fn short_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Format a minor-unit amount as major units with two decimals
pub fn format_minor(amount: f64) -> String {
    format!("{:.2}", amount / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parses_spanish_keys() {
        assert_eq!("dietas".parse::<Category>().unwrap(), Category::Meals);
        assert_eq!("Vestimenta".parse::<Category>().unwrap(), Category::Clothing);
        assert_eq!(
            "servicios_profesionales".parse::<Category>().unwrap(),
            Category::ProfessionalServices
        );
        assert_eq!("software".parse::<Category>().unwrap(), Category::Software);
        assert!("groceries".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_round_trips_through_as_str() {
        for category in Category::all() {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), *category);
        }
    }

    #[test]
    fn test_month_key_navigation() {
        let jan = MonthKey::new(2024, 1).unwrap();
        assert_eq!(jan.pred(), MonthKey::new(2023, 12).unwrap());
        assert_eq!(jan.succ(), MonthKey::new(2024, 2).unwrap());
        assert_eq!(
            MonthKey::new(2024, 2).unwrap().first_day(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
        assert_eq!(jan.to_string(), "2024-01");
        assert_eq!("2024-01".parse::<MonthKey>().unwrap(), jan);
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!(MonthKey::new(2024, 0).is_none());
    }

    #[test]
    fn test_month_key_orders_chronologically() {
        let dec = MonthKey::new(2023, 12).unwrap();
        let jan = MonthKey::new(2024, 1).unwrap();
        assert!(dec < jan);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_attachment_reference_uses_file_name() {
        let att = Attachment::reference("/uploads/expenses/factura-001.pdf");
        assert_eq!(att.file_name, "factura-001.pdf");
        assert_eq!(att.id.len(), 12);
    }

    #[test]
    fn test_format_minor() {
        assert_eq!(format_minor(7500.0), "75.00");
        assert_eq!(format_minor(75.0), "0.75");
    }
}
