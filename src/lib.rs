//! # Reconciliation Core
//!
//! Matches bank statement entries against payment receipts and against
//! declarative matching rules.
//!
//! ## Features
//!
//! - **Declarative rules**: JSON or TOML rule sets, fully validated at load time
//! - **Rule engine**: priority-ordered, first-match evaluation over entry fields
//! - **Exact matching**: amount equality within a configurable payment-date window
//! - **Pluggable strategies**: run as ordered passes over a shared pool of records
//! - **Statistics**: per-status and per-strategy counts, confidence bands, totals
//! - **Storage abstraction**: rule definitions come from any `RuleDefinitionSource`
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{
//!     rules, ReceiptRecord, ReconciliationConfig, Reconciler, StatementEntry,
//! };
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! let rule_set = rules::load_json(r#"{ "rules": [] }"#).unwrap();
//! let reconciler =
//!     Reconciler::new(ReconciliationConfig::default(), Arc::new(rule_set)).unwrap();
//!
//! let day = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
//! let entries = vec![StatementEntry::debit(1, day, BigDecimal::from(150), "PIX LOJA").unwrap()];
//! let receipts = vec![ReceiptRecord::simple(1, BigDecimal::from(150), day).unwrap()];
//!
//! let report = reconciler.reconcile(&entries, &receipts).unwrap();
//! assert_eq!(report.stats.matched.count, 1);
//! ```

pub mod config;
pub mod reconciliation;
pub mod rules;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use reconciliation::*;
pub use rules::{RuleConflictError, RuleDefect, RuleSet, RuleValidationError};
pub use traits::*;
pub use types::*;
