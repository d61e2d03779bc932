//! Multi-pass reconciliation runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ReconciliationConfig;
use crate::reconciliation::exact::ExactValueDateStrategy;
use crate::reconciliation::pool::MatchPool;
use crate::reconciliation::rule_based::RuleBasedStrategy;
use crate::reconciliation::stats::ReconciliationStats;
use crate::rules::RuleSet;
use crate::traits::{MatchingStrategy, Proposal};
use crate::types::*;
use crate::utils::validation::is_valid_match_confidence;

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    /// Exactly one result per input entry, in entry-id order
    pub results: Vec<MatchResult>,
    pub unresolved_entries: Vec<EntryId>,
    /// Receipts no pass claimed, in id order
    pub unresolved_receipts: Vec<ReceiptId>,
    pub stats: ReconciliationStats,
}

impl ReconciliationReport {
    pub fn matches(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter(|r| r.is_matched())
    }

    pub fn result_for(&self, entry_id: EntryId) -> Option<&MatchResult> {
        self.results
            .binary_search_by_key(&entry_id, |r| r.entry_id)
            .ok()
            .map(|i| &self.results[i])
    }
}

/// Runs matching strategies as ordered passes over a shared pool
///
/// Each pass sees only the entries and receipts earlier passes left
/// unclaimed. Strategies propose; the reconciler applies the confidence floor
/// and claims.
pub struct Reconciler {
    config: ReconciliationConfig,
    strategies: Vec<Box<dyn MatchingStrategy>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl Reconciler {
    /// Build the configured built-in strategies around `rule_set`
    pub fn new(
        config: ReconciliationConfig,
        rule_set: Arc<RuleSet>,
    ) -> ReconciliationResult<Self> {
        config.validate()?;

        let strategies = config
            .strategy_order
            .iter()
            .map(|id| -> Box<dyn MatchingStrategy> {
                match id {
                    StrategyId::RuleBased => Box::new(RuleBasedStrategy::new(rule_set.clone())),
                    StrategyId::ExactValueDate => {
                        Box::new(ExactValueDateStrategy::new(config.date_tolerance_days))
                    }
                }
            })
            .collect();

        Ok(Self { config, strategies })
    }

    /// Use caller-supplied strategies; `strategy_order` in the config is ignored
    pub fn with_strategies(
        config: ReconciliationConfig,
        strategies: Vec<Box<dyn MatchingStrategy>>,
    ) -> ReconciliationResult<Self> {
        config.validate()?;
        if strategies.is_empty() {
            return Err(ReconciliationError::Configuration(
                "at least one matching strategy is required".to_string(),
            ));
        }
        Ok(Self { config, strategies })
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    #[instrument(skip_all, fields(entries = entries.len(), receipts = receipts.len()))]
    pub fn reconcile(
        &self,
        entries: &[StatementEntry],
        receipts: &[ReceiptRecord],
    ) -> ReconciliationResult<ReconciliationReport> {
        self.run(entries.iter().collect(), receipts.iter().collect())
    }

    /// Reconcile only the entries and receipts accepted by the filters
    #[instrument(skip_all, fields(entries = entries.len(), receipts = receipts.len()))]
    pub fn reconcile_filtered<FE, FR>(
        &self,
        entries: &[StatementEntry],
        receipts: &[ReceiptRecord],
        entry_filter: FE,
        receipt_filter: FR,
    ) -> ReconciliationResult<ReconciliationReport>
    where
        FE: Fn(&StatementEntry) -> bool,
        FR: Fn(&ReceiptRecord) -> bool,
    {
        let entries: Vec<&StatementEntry> =
            entries.iter().filter(|e| entry_filter(e)).collect();
        let receipts: Vec<&ReceiptRecord> =
            receipts.iter().filter(|r| receipt_filter(r)).collect();
        debug!(
            entries = entries.len(),
            receipts = receipts.len(),
            "Filtered reconciliation input"
        );
        self.run(entries, receipts)
    }

    fn run(
        &self,
        entries: Vec<&StatementEntry>,
        receipts: Vec<&ReceiptRecord>,
    ) -> ReconciliationResult<ReconciliationReport> {
        let run_id = Uuid::new_v4();
        if entries.is_empty() {
            warn!(%run_id, "No statement entries to reconcile");
        }

        let mut pool = MatchPool::new(entries.iter().copied(), receipts.iter().copied())?;
        let mut settled: BTreeMap<EntryId, MatchResult> = BTreeMap::new();

        for (pass, strategy) in self.strategies.iter().enumerate() {
            let name = strategy.name();
            for entry in pool.pending_entries() {
                let outcome = match strategy.propose(entry, pool.receipts()) {
                    Ok(Some(proposal)) => self.settle(&mut pool, entry, proposal, name, pass),
                    Ok(None) => Ok(None),
                    Err(error) => Err(error),
                };

                match outcome {
                    Ok(Some(result)) => {
                        settled.insert(entry.id, result);
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(
                            entry_id = %entry.id,
                            strategy = name,
                            %error,
                            "Entry evaluation failed"
                        );
                        pool.claim_entry(entry.id);
                        settled.insert(
                            entry.id,
                            MatchResult::failed(entry.id, name, pass, &error),
                        );
                    }
                }
            }
            debug!(
                pass,
                strategy = name,
                remaining = pool.pending_entry_count(),
                "Pass complete"
            );
        }

        let (remaining_entries, remaining_receipts) = pool.into_remaining();
        for entry_id in remaining_entries {
            settled.insert(entry_id, MatchResult::unresolved(entry_id));
        }

        let results: Vec<MatchResult> = settled.into_values().collect();
        let unresolved_entries: Vec<EntryId> = results
            .iter()
            .filter(|r| !r.is_matched())
            .map(|r| r.entry_id)
            .collect();
        let unresolved_receipts: Vec<ReceiptId> =
            remaining_receipts.iter().map(|r| r.id).collect();

        let mut ordered = entries;
        ordered.sort_by_key(|e| e.id);
        let stats = ReconciliationStats::from_results(
            results.iter().zip(ordered.iter().copied()),
            receipts.len(),
            self.config.auto_approve_threshold,
        );

        info!(
            %run_id,
            matched = stats.matched.count,
            unresolved = stats.unresolved.count,
            failed = stats.failed,
            "Reconciliation complete"
        );

        Ok(ReconciliationReport {
            run_id,
            results,
            unresolved_entries,
            unresolved_receipts,
            stats,
        })
    }

    /// Turn an accepted proposal into a result, claiming what it references
    fn settle(
        &self,
        pool: &mut MatchPool<'_>,
        entry: &StatementEntry,
        proposal: Proposal,
        strategy_name: &str,
        pass: usize,
    ) -> Result<Option<MatchResult>, EvaluationError> {
        if !proposal.status.is_matched() {
            return Err(EvaluationError::Strategy(format!(
                "proposed status {} is not a match",
                proposal.status
            )));
        }
        if !is_valid_match_confidence(proposal.confidence) {
            return Err(EvaluationError::Strategy(format!(
                "proposed confidence {} is outside (0, 1]",
                proposal.confidence
            )));
        }
        if proposal.confidence < self.config.min_confidence {
            debug!(
                entry_id = %entry.id,
                confidence = proposal.confidence,
                "Proposal below confidence floor"
            );
            return Ok(None);
        }

        if let Some(receipt_id) = proposal.receipt_id {
            if !pool.claim_receipt(receipt_id) {
                warn!(entry_id = %entry.id, %receipt_id, "Receipt not available, proposal dropped");
                return Ok(None);
            }
        }
        pool.claim_entry(entry.id);

        Ok(Some(MatchResult {
            entry_id: entry.id,
            receipt_id: proposal.receipt_id,
            status: proposal.status,
            confidence: proposal.confidence,
            strategy_name: Some(strategy_name.to_string()),
            note: proposal.note,
            evaluated_at_priority: Some(pass),
            rule_id: proposal.rule_id,
            category: proposal.category,
            error: None,
        }))
    }
}

/// One-off run with the built-in strategies in `strategy_order`
pub fn reconcile(
    entries: &[StatementEntry],
    receipts: &[ReceiptRecord],
    rule_set: Arc<RuleSet>,
    strategy_order: &[StrategyId],
) -> ReconciliationResult<ReconciliationReport> {
    let config = ReconciliationConfig::default().with_strategy_order(strategy_order.to_vec());
    Reconciler::new(config, rule_set)?.reconcile(entries, receipts)
}
