//! Traits for rule storage abstraction and pluggable matching

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::reconciliation::pool::ReceiptPool;
use crate::types::*;

/// Text encoding of a rule-set definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Toml,
}

/// Raw rule-set definition as kept by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub format: DocumentFormat,
    pub content: String,
}

impl RuleDocument {
    pub fn json(content: impl Into<String>) -> Self {
        Self {
            format: DocumentFormat::Json,
            content: content.into(),
        }
    }

    pub fn toml(content: impl Into<String>) -> Self {
        Self {
            format: DocumentFormat::Toml,
            content: content.into(),
        }
    }
}

/// Storage abstraction for rule-set definitions
///
/// Lets the engine load rules from any medium (files, a database, a
/// configuration service, in-memory) by implementing these methods.
#[async_trait]
pub trait RuleDefinitionSource: Send + Sync {
    /// Fetch a named definition
    async fn fetch(&self, name: &str) -> ReconciliationResult<RuleDocument>;

    /// Names of all stored definitions, sorted
    async fn list(&self) -> ReconciliationResult<Vec<String>>;
}

/// What a strategy suggests for one entry
///
/// Proposals are only suggestions: the orchestrator applies the confidence
/// floor and performs the claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub receipt_id: Option<ReceiptId>,
    pub status: MatchStatus,
    pub confidence: f64,
    pub note: String,
    pub rule_id: Option<String>,
    pub category: Option<String>,
}

/// One pass of the reconciliation pipeline
///
/// Strategies read the pool of unclaimed receipts but never mutate it.
pub trait MatchingStrategy: Send + Sync {
    /// Name recorded on every result this strategy produces
    fn name(&self) -> &str;

    /// Inspect one unmatched entry
    fn propose(
        &self,
        entry: &StatementEntry,
        receipts: &ReceiptPool<'_>,
    ) -> Result<Option<Proposal>, EvaluationError>;
}
