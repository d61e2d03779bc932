//! Run statistics

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::*;

/// Lower bound of the high-confidence band
pub const HIGH_CONFIDENCE: f64 = 0.90;
/// Lower bound of the medium-confidence band
pub const MEDIUM_CONFIDENCE: f64 = 0.70;

/// A count and its share of all entries, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Share {
    pub count: usize,
    pub percentage: f64,
}

impl Share {
    fn of(count: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        };
        Self { count, percentage }
    }
}

/// Spread of confidences over matched results
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Matched results per confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfidenceBands {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationStats {
    pub total_entries: usize,
    pub matched: Share,
    pub unresolved: Share,
    /// Entries whose evaluation failed; also counted as unresolved
    pub failed: usize,
    pub by_status: BTreeMap<MatchStatus, Share>,
    /// Matched results per producing strategy
    pub by_strategy: BTreeMap<String, Share>,
    /// `None` when nothing matched
    pub confidence: Option<ConfidenceSummary>,
    pub bands: ConfidenceBands,
    pub auto_approved: usize,
    pub needs_review: usize,
    /// Sum of matched entry amounts
    pub total_reconciled_amount: BigDecimal,
    pub receipts_total: usize,
    pub receipts_claimed: usize,
    pub receipts_unclaimed: usize,
}

impl ReconciliationStats {
    /// Aggregate results paired with their entries
    pub fn from_results<'a, I>(
        results: I,
        receipts_total: usize,
        auto_approve_threshold: f64,
    ) -> Self
    where
        I: IntoIterator<Item = (&'a MatchResult, &'a StatementEntry)>,
    {
        let mut total_entries = 0;
        let mut failed = 0;
        let mut status_counts: BTreeMap<MatchStatus, usize> = BTreeMap::new();
        let mut strategy_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut confidences = Vec::new();
        let mut bands = ConfidenceBands::default();
        let mut auto_approved = 0;
        let mut receipts_claimed = 0;
        let mut total_reconciled_amount = BigDecimal::from(0);

        for (result, entry) in results {
            total_entries += 1;
            *status_counts.entry(result.status).or_default() += 1;

            if result.error.is_some() {
                failed += 1;
            }
            if !result.is_matched() {
                continue;
            }

            if let Some(name) = &result.strategy_name {
                *strategy_counts.entry(name.clone()).or_default() += 1;
            }
            if result.receipt_id.is_some() {
                receipts_claimed += 1;
            }
            total_reconciled_amount += entry.amount.clone();
            confidences.push(result.confidence);

            if result.confidence >= HIGH_CONFIDENCE {
                bands.high += 1;
            } else if result.confidence >= MEDIUM_CONFIDENCE {
                bands.medium += 1;
            } else {
                bands.low += 1;
            }
            if result.confidence >= auto_approve_threshold {
                auto_approved += 1;
            }
        }

        let matched = confidences.len();
        let confidence = (!confidences.is_empty()).then(|| ConfidenceSummary {
            min: confidences.iter().copied().fold(f64::INFINITY, f64::min),
            max: confidences.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: confidences.iter().sum::<f64>() / matched as f64,
        });

        Self {
            total_entries,
            matched: Share::of(matched, total_entries),
            unresolved: Share::of(total_entries - matched, total_entries),
            failed,
            by_status: status_counts
                .into_iter()
                .map(|(status, count)| (status, Share::of(count, total_entries)))
                .collect(),
            by_strategy: strategy_counts
                .into_iter()
                .map(|(name, count)| (name, Share::of(count, total_entries)))
                .collect(),
            confidence,
            bands,
            auto_approved,
            needs_review: matched - auto_approved,
            total_reconciled_amount: total_reconciled_amount.with_scale(2),
            receipts_total,
            receipts_claimed,
            receipts_unclaimed: receipts_total.saturating_sub(receipts_claimed),
        }
    }

    pub fn status_count(&self, status: MatchStatus) -> usize {
        self.by_status.get(&status).map_or(0, |share| share.count)
    }

    pub fn strategy_count(&self, name: &str) -> usize {
        self.by_strategy.get(name).map_or(0, |share| share.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn entry(id: u64, amount: &str) -> StatementEntry {
        StatementEntry::debit(
            id,
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            BigDecimal::from_str(amount).unwrap(),
            "X",
        )
        .unwrap()
    }

    fn matched(id: u64, status: MatchStatus, confidence: f64, strategy: &str) -> MatchResult {
        MatchResult {
            status,
            confidence,
            strategy_name: Some(strategy.to_string()),
            receipt_id: (status == MatchStatus::MatchedExact).then_some(ReceiptId(id)),
            ..MatchResult::unresolved(EntryId(id))
        }
    }

    #[test]
    fn test_counts_bands_and_amounts() {
        let entries = vec![
            entry(1, "10.00"),
            entry(2, "20.50"),
            entry(3, "5.00"),
            entry(4, "1.00"),
        ];
        let results = vec![
            matched(1, MatchStatus::MatchedByRule, 0.95, "rule_based"),
            matched(2, MatchStatus::MatchedExact, 0.85, "exact_value_date"),
            matched(3, MatchStatus::MatchedByRule, 0.60, "rule_based"),
            MatchResult::unresolved(EntryId(4)),
        ];

        let stats = ReconciliationStats::from_results(results.iter().zip(&entries), 3, 0.90);

        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.matched.count, 3);
        assert_eq!(stats.matched.percentage, 75.0);
        assert_eq!(stats.unresolved.count, 1);
        assert_eq!(stats.status_count(MatchStatus::MatchedByRule), 2);
        assert_eq!(stats.strategy_count("exact_value_date"), 1);
        assert_eq!(
            stats.bands,
            ConfidenceBands {
                high: 1,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(stats.auto_approved, 1);
        assert_eq!(stats.needs_review, 2);
        assert_eq!(stats.total_reconciled_amount, BigDecimal::from_str("35.50").unwrap());
        assert_eq!(stats.receipts_claimed, 1);
        assert_eq!(stats.receipts_unclaimed, 2);

        let confidence = stats.confidence.unwrap();
        assert_eq!(confidence.min, 0.60);
        assert_eq!(confidence.max, 0.95);
    }

    #[test]
    fn test_empty_run() {
        let stats = ReconciliationStats::from_results(std::iter::empty(), 0, 0.90);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.matched.percentage, 0.0);
        assert!(stats.confidence.is_none());
    }
}
