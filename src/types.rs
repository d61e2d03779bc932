//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::rules::RuleValidationError;
use crate::utils::validation::{
    normalize_description, validate_amount_scale, validate_extraction_confidence,
    validate_positive_amount,
};

/// Direction of a bank statement movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Money leaving the account
    Debit,
    /// Money entering the account
    Credit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Debit => "DEBIT",
            EntryKind::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    /// Accepts the long names as well as the single-letter bank codes `D` and `C`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBIT" | "D" => Ok(EntryKind::Debit),
            "CREDIT" | "C" => Ok(EntryKind::Credit),
            other => Err(format!("unknown entry kind '{}'", other)),
        }
    }
}

/// Stable identity of a statement entry, assigned at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Stable identity of a payment receipt, assigned at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub u64);

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// One movement on a bank statement
///
/// Entries are immutable once built; the engine only ever borrows them.
/// Deserialization goes through [`StatementEntry::new`], so decoded entries
/// are validated and normalized like constructed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StatementEntryFields")]
pub struct StatementEntry {
    /// Identity assigned by the ingestion collaborator
    pub id: EntryId,
    /// Booking date of the movement
    pub date: NaiveDate,
    /// Unsigned amount with at most two fraction digits
    pub amount: BigDecimal,
    /// Upper-cased description with collapsed whitespace
    pub description: String,
    /// Debit or credit
    pub kind: EntryKind,
}

impl StatementEntry {
    /// Create a new statement entry, normalizing the description
    pub fn new(
        id: EntryId,
        date: NaiveDate,
        amount: BigDecimal,
        description: &str,
        kind: EntryKind,
    ) -> ReconciliationResult<Self> {
        validate_positive_amount(&amount)?;
        validate_amount_scale(&amount)?;

        Ok(Self {
            id,
            date,
            amount: amount.with_scale(2),
            description: normalize_description(description),
            kind,
        })
    }

    /// Shortcut for a debit entry
    pub fn debit(
        id: u64,
        date: NaiveDate,
        amount: BigDecimal,
        description: &str,
    ) -> ReconciliationResult<Self> {
        Self::new(EntryId(id), date, amount, description, EntryKind::Debit)
    }

    /// Shortcut for a credit entry
    pub fn credit(
        id: u64,
        date: NaiveDate,
        amount: BigDecimal,
        description: &str,
    ) -> ReconciliationResult<Self> {
        Self::new(EntryId(id), date, amount, description, EntryKind::Credit)
    }

    /// The description, or `None` when the statement carried no text
    pub fn description_text(&self) -> Option<&str> {
        if self.description.is_empty() {
            None
        } else {
            Some(&self.description)
        }
    }
}

/// External evidence of a payment (usually OCR-extracted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReceiptRecordFields")]
pub struct ReceiptRecord {
    /// Identity assigned by the ingestion collaborator
    pub id: ReceiptId,
    /// Paid amount
    pub amount: BigDecimal,
    /// Date printed on the receipt
    pub payment_date: NaiveDate,
    /// Who received the payment, when the extractor found it
    pub beneficiary: Option<String>,
    /// How sure the extractor was about the fields, in [0, 1]
    pub extraction_confidence: f64,
}

impl ReceiptRecord {
    /// Create a new receipt record
    pub fn new(
        id: ReceiptId,
        amount: BigDecimal,
        payment_date: NaiveDate,
        beneficiary: Option<String>,
        extraction_confidence: f64,
    ) -> ReconciliationResult<Self> {
        validate_positive_amount(&amount)?;
        validate_amount_scale(&amount)?;
        validate_extraction_confidence(extraction_confidence)?;

        Ok(Self {
            id,
            amount: amount.with_scale(2),
            payment_date,
            beneficiary: beneficiary.filter(|b| !b.trim().is_empty()),
            extraction_confidence,
        })
    }

    /// Receipt with no beneficiary and full extraction confidence
    pub fn simple(
        id: u64,
        amount: BigDecimal,
        payment_date: NaiveDate,
    ) -> ReconciliationResult<Self> {
        Self::new(ReceiptId(id), amount, payment_date, None, 1.0)
    }
}

#[derive(Deserialize)]
struct StatementEntryFields {
    id: EntryId,
    date: NaiveDate,
    amount: BigDecimal,
    #[serde(default)]
    description: String,
    kind: EntryKind,
}

impl TryFrom<StatementEntryFields> for StatementEntry {
    type Error = ReconciliationError;

    fn try_from(fields: StatementEntryFields) -> Result<Self, Self::Error> {
        Self::new(
            fields.id,
            fields.date,
            fields.amount,
            &fields.description,
            fields.kind,
        )
    }
}

#[derive(Deserialize)]
struct ReceiptRecordFields {
    id: ReceiptId,
    amount: BigDecimal,
    payment_date: NaiveDate,
    #[serde(default)]
    beneficiary: Option<String>,
    extraction_confidence: f64,
}

impl TryFrom<ReceiptRecordFields> for ReceiptRecord {
    type Error = ReconciliationError;

    fn try_from(fields: ReceiptRecordFields) -> Result<Self, Self::Error> {
        Self::new(
            fields.id,
            fields.amount,
            fields.payment_date,
            fields.beneficiary,
            fields.extraction_confidence,
        )
    }
}

/// Terminal state of an entry after a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Unresolved,
    MatchedExact,
    MatchedByRule,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Unresolved => "UNRESOLVED",
            MatchStatus::MatchedExact => "MATCHED_EXACT",
            MatchStatus::MatchedByRule => "MATCHED_BY_RULE",
        }
    }

    pub fn is_matched(&self) -> bool {
        !matches!(self, MatchStatus::Unresolved)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one statement entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Entry this result explains
    pub entry_id: EntryId,
    /// Claimed receipt; absent for unresolved and self-explanatory entries
    pub receipt_id: Option<ReceiptId>,
    /// Final status
    pub status: MatchStatus,
    /// Certainty of the match in (0, 1], or 0 when unresolved
    pub confidence: f64,
    /// Strategy that produced the result
    pub strategy_name: Option<String>,
    /// Audit note
    pub note: String,
    /// Index of the pass (position in the strategy order) that produced the result
    pub evaluated_at_priority: Option<usize>,
    /// Rule that approved the entry, for rule matches
    pub rule_id: Option<String>,
    /// Category attached by the rule action
    pub category: Option<String>,
    /// Evaluation failure that left the entry unresolved
    pub error: Option<String>,
}

impl MatchResult {
    /// Result for an entry no strategy could explain
    pub fn unresolved(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            receipt_id: None,
            status: MatchStatus::Unresolved,
            confidence: 0.0,
            strategy_name: None,
            note: "No matching receipt or rule".to_string(),
            evaluated_at_priority: None,
            rule_id: None,
            category: None,
            error: None,
        }
    }

    /// Result for an entry whose evaluation failed inside a strategy
    pub fn failed(
        entry_id: EntryId,
        strategy_name: &str,
        pass: usize,
        error: &EvaluationError,
    ) -> Self {
        Self {
            entry_id,
            receipt_id: None,
            status: MatchStatus::Unresolved,
            confidence: 0.0,
            strategy_name: Some(strategy_name.to_string()),
            note: format!("Evaluation failed in strategy '{}': {}", strategy_name, error),
            evaluated_at_priority: Some(pass),
            rule_id: None,
            category: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.status.is_matched()
    }
}

/// Built-in matching strategies, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    RuleBased,
    ExactValueDate,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::RuleBased => "rule_based",
            StrategyId::ExactValueDate => "exact_value_date",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = ReconciliationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rule_based" => Ok(StrategyId::RuleBased),
            "exact_value_date" => Ok(StrategyId::ExactValueDate),
            _ => Err(ReconciliationError::Configuration(format!(
                "Unknown matching strategy: {}",
                s
            ))),
        }
    }
}

/// Failure while evaluating a single entry
///
/// Never escapes a reconciliation run; the orchestrator turns it into an
/// unresolved result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("condition on '{field}' with operator '{operator}' cannot compare a {found} value")]
    TypeMismatch {
        field: String,
        operator: String,
        found: String,
    },
    #[error("strategy failure: {0}")]
    Strategy(String),
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Duplicate record identity: {0}")]
    DuplicateRecord(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    RuleValidation(#[from] RuleValidationError),
    #[error("Rule source error: {0}")]
    Source(String),
}

/// Result type for reconciliation operations
pub type ReconciliationResult<T> = Result<T, ReconciliationError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 2).unwrap()
    }

    #[test]
    fn test_entry_normalizes_and_rescales() {
        let entry =
            StatementEntry::debit(1, date(), BigDecimal::from(15), "  tarifa   pix ").unwrap();
        assert_eq!(entry.description, "TARIFA PIX");
        assert_eq!(entry.amount.to_string(), "15.00");
        assert_eq!(entry.id.to_string(), "E1");
    }

    #[test]
    fn test_invalid_records_rejected() {
        let too_precise = BigDecimal::from_str("1.005").unwrap();
        assert!(StatementEntry::debit(1, date(), too_precise, "X").is_err());
        assert!(StatementEntry::credit(1, date(), BigDecimal::from(0), "X").is_err());
        assert!(
            ReceiptRecord::new(ReceiptId(1), BigDecimal::from(1), date(), None, 1.2).is_err()
        );

        let receipt = ReceiptRecord::new(
            ReceiptId(1),
            BigDecimal::from(1),
            date(),
            Some("   ".to_string()),
            0.0,
        )
        .unwrap();
        assert_eq!(receipt.beneficiary, None);
    }

    #[test]
    fn test_deserialized_records_are_validated() {
        let entry: StatementEntry = serde_json::from_value(serde_json::json!({
            "id": 4,
            "date": "2025-11-02",
            "amount": "15",
            "description": "  tarifa   pix ",
            "kind": "DEBIT"
        }))
        .unwrap();
        assert_eq!(entry.description, "TARIFA PIX");
        assert_eq!(entry.amount.to_string(), "15.00");

        let negative = serde_json::from_value::<StatementEntry>(serde_json::json!({
            "id": 5,
            "date": "2025-11-02",
            "amount": "-3.00",
            "description": "ESTORNO",
            "kind": "CREDIT"
        }));
        assert!(negative.is_err());

        let receipt = serde_json::from_value::<ReceiptRecord>(serde_json::json!({
            "id": 9,
            "amount": "80.5",
            "payment_date": "2025-11-03",
            "extraction_confidence": 1.5
        }));
        assert!(receipt.is_err());
    }

    #[test]
    fn test_kind_and_strategy_names() {
        assert_eq!(EntryKind::from_str("d"), Ok(EntryKind::Debit));
        assert_eq!(EntryKind::from_str("CREDIT"), Ok(EntryKind::Credit));
        assert!(EntryKind::from_str("TRANSFER").is_err());

        assert_eq!(
            StrategyId::from_str("exact-value-date").unwrap(),
            StrategyId::ExactValueDate
        );
        assert_eq!(StrategyId::RuleBased.to_string(), "rule_based");
        assert!(StrategyId::from_str("fuzzy").is_err());
    }

    #[test]
    fn test_failed_result_keeps_error() {
        let error = EvaluationError::Strategy("boom".to_string());
        let result = MatchResult::failed(EntryId(3), "exact_value_date", 1, &error);
        assert!(!result.is_matched());
        assert_eq!(result.evaluated_at_priority, Some(1));
        assert_eq!(result.error.as_deref(), Some("strategy failure: boom"));
    }
}
