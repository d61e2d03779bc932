//! Reconciliation of bank statement entries against receipts
//!
//! A run is a sequence of passes, one per matching strategy, over a pool of
//! still-unclaimed entries and receipts. Whatever no pass claims ends up
//! unresolved.

pub mod exact;
pub mod orchestrator;
pub mod pool;
pub mod rule_based;
pub mod stats;

pub use exact::*;
pub use orchestrator::*;
pub use pool::*;
pub use rule_based::*;
pub use stats::*;
