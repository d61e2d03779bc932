//! Exact amount matching within a payment-date window

use tracing::debug;

use crate::reconciliation::pool::ReceiptPool;
use crate::traits::{MatchingStrategy, Proposal};
use crate::types::*;

/// Confidence of every exact amount/date match
pub const EXACT_MATCH_CONFIDENCE: f64 = 0.85;

/// Extraction confidence from which a receipt is called reliable in the audit note
pub const RELIABLE_EXTRACTION_THRESHOLD: f64 = 0.80;

/// Pairs an entry with an unclaimed receipt of the same amount
///
/// The receipt's payment date must lie within `tolerance_days` of the entry
/// date, in either direction, boundary included. Among candidates the
/// closest date wins, then the lowest receipt id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactValueDateStrategy {
    tolerance_days: u32,
}

impl ExactValueDateStrategy {
    pub fn new(tolerance_days: u32) -> Self {
        Self { tolerance_days }
    }

    pub fn tolerance_days(&self) -> u32 {
        self.tolerance_days
    }

    /// Best unclaimed receipt for `entry`, with its distance in days
    pub fn best_candidate<'a>(
        &self,
        entry: &StatementEntry,
        receipts: &ReceiptPool<'a>,
    ) -> Option<(&'a ReceiptRecord, u64)> {
        receipts
            .unclaimed()
            .filter(|receipt| receipt.amount == entry.amount)
            .map(|receipt| {
                let days = (receipt.payment_date - entry.date).num_days().unsigned_abs();
                (receipt, days)
            })
            .filter(|(_, days)| *days <= u64::from(self.tolerance_days))
            .min_by_key(|(receipt, days)| (*days, receipt.id))
    }
}

impl MatchingStrategy for ExactValueDateStrategy {
    fn name(&self) -> &str {
        StrategyId::ExactValueDate.as_str()
    }

    fn propose(
        &self,
        entry: &StatementEntry,
        receipts: &ReceiptPool<'_>,
    ) -> Result<Option<Proposal>, EvaluationError> {
        let Some((receipt, days)) = self.best_candidate(entry, receipts) else {
            return Ok(None);
        };

        debug!(entry_id = %entry.id, receipt_id = %receipt.id, days, "Exact match candidate");

        Ok(Some(Proposal {
            receipt_id: Some(receipt.id),
            status: MatchStatus::MatchedExact,
            confidence: EXACT_MATCH_CONFIDENCE,
            note: audit_note(receipt, days),
            rule_id: None,
            category: None,
        }))
    }
}

fn audit_note(receipt: &ReceiptRecord, days: u64) -> String {
    let mut note = format!("Exact amount match with receipt {}; ", receipt.id);
    if days == 0 {
        note.push_str("same date");
    } else {
        note.push_str(&format!("dates differ by {} day(s)", days));
    }
    if receipt.extraction_confidence >= RELIABLE_EXTRACTION_THRESHOLD {
        note.push_str(&format!(
            "; reliable extraction ({:.0}%)",
            receipt.extraction_confidence * 100.0
        ));
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::pool::MatchPool;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
    }

    fn amount(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_same_day_exact_match() {
        let entry = StatementEntry::debit(1, date(3), amount("150.00"), "PIX").unwrap();
        let receipts = vec![ReceiptRecord::simple(9, amount("150.0"), date(3)).unwrap()];
        let pool = MatchPool::new([&entry], &receipts).unwrap();

        let proposal = ExactValueDateStrategy::default()
            .propose(&entry, pool.receipts())
            .unwrap()
            .unwrap();

        assert_eq!(proposal.receipt_id, Some(ReceiptId(9)));
        assert_eq!(proposal.status, MatchStatus::MatchedExact);
        assert_eq!(proposal.confidence, EXACT_MATCH_CONFIDENCE);
        assert!(proposal.note.contains("same date"));
        assert!(proposal.note.contains("reliable extraction (100%)"));
    }

    #[test]
    fn test_tolerance_is_symmetric_and_inclusive() {
        let entry = StatementEntry::debit(1, date(10), amount("50.00"), "X").unwrap();
        let strategy = ExactValueDateStrategy::new(2);

        for (day, expected) in [(8, true), (12, true), (7, false), (13, false)] {
            let receipts = vec![ReceiptRecord::simple(1, amount("50.00"), date(day)).unwrap()];
            let pool = MatchPool::new([&entry], &receipts).unwrap();
            assert_eq!(
                strategy.propose(&entry, pool.receipts()).unwrap().is_some(),
                expected,
                "receipt dated day {}",
                day
            );
        }
    }

    #[test]
    fn test_closest_date_then_lowest_id_wins() {
        let entry = StatementEntry::debit(1, date(10), amount("50.00"), "X").unwrap();
        let receipts = vec![
            ReceiptRecord::simple(5, amount("50.00"), date(12)).unwrap(),
            ReceiptRecord::simple(4, amount("50.00"), date(9)).unwrap(),
            ReceiptRecord::simple(2, amount("50.00"), date(11)).unwrap(),
        ];
        let pool = MatchPool::new([&entry], &receipts).unwrap();
        let strategy = ExactValueDateStrategy::new(3);

        let (receipt, days) = strategy.best_candidate(&entry, pool.receipts()).unwrap();
        assert_eq!(receipt.id, ReceiptId(2));
        assert_eq!(days, 1);
    }

    #[test]
    fn test_amount_must_be_equal() {
        let entry = StatementEntry::debit(1, date(10), amount("50.00"), "X").unwrap();
        let receipts = vec![ReceiptRecord::simple(1, amount("50.01"), date(10)).unwrap()];
        let pool = MatchPool::new([&entry], &receipts).unwrap();

        assert!(ExactValueDateStrategy::default()
            .propose(&entry, pool.receipts())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_low_extraction_confidence_not_called_reliable() {
        let entry = StatementEntry::debit(1, date(10), amount("50.00"), "X").unwrap();
        let receipts = vec![ReceiptRecord::new(
            ReceiptId(1),
            amount("50.00"),
            date(11),
            Some("Loja".to_string()),
            0.55,
        )
        .unwrap()];
        let pool = MatchPool::new([&entry], &receipts).unwrap();

        let proposal = ExactValueDateStrategy::new(1)
            .propose(&entry, pool.receipts())
            .unwrap()
            .unwrap();
        assert!(proposal.note.contains("dates differ by 1 day(s)"));
        assert!(!proposal.note.contains("reliable"));
    }
}
