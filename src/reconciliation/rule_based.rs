//! Rule-driven classification of entries that need no receipt

use std::sync::Arc;
use tracing::debug;

use crate::reconciliation::pool::ReceiptPool;
use crate::rules::{self, RuleSet};
use crate::traits::{MatchingStrategy, Proposal};
use crate::types::*;

/// Explains entries (bank fees, taxes, transfers) through the rule set
///
/// Never looks at receipts: a rule match carries no receipt.
#[derive(Debug, Clone)]
pub struct RuleBasedStrategy {
    rule_set: Arc<RuleSet>,
}

impl RuleBasedStrategy {
    pub fn new(rule_set: Arc<RuleSet>) -> Self {
        Self { rule_set }
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }
}

impl MatchingStrategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        StrategyId::RuleBased.as_str()
    }

    fn propose(
        &self,
        entry: &StatementEntry,
        _receipts: &ReceiptPool<'_>,
    ) -> Result<Option<Proposal>, EvaluationError> {
        let Some(rule) = rules::evaluate(&self.rule_set, entry)? else {
            return Ok(None);
        };

        debug!(entry_id = %entry.id, rule_id = %rule.id, "Rule proposal");

        Ok(Some(Proposal {
            receipt_id: None,
            status: MatchStatus::MatchedByRule,
            confidence: rule.action.confidence,
            note: rule.action.note.clone(),
            rule_id: Some(rule.id.clone()),
            category: rule.action.category.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::pool::MatchPool;
    use crate::rules::{Action, Condition, Field, Predicate, Rule};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    #[test]
    fn test_rule_match_carries_action_metadata() {
        let rule_set = RuleSet::new(vec![Rule::new(
            "iof",
            "IOF",
            1,
            vec![Condition::new(
                Field::Description,
                Predicate::Contains(vec!["IOF".to_string()]),
            )],
            Action::auto_approve(0.97, "Tax").with_category("taxes"),
        )])
        .unwrap();
        let strategy = RuleBasedStrategy::new(Arc::new(rule_set));

        let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
        let entry =
            StatementEntry::debit(1, date, BigDecimal::from(3), "iof compra exterior").unwrap();
        let receipts = vec![ReceiptRecord::simple(1, BigDecimal::from(3), date).unwrap()];
        let pool = MatchPool::new([&entry], &receipts).unwrap();

        let proposal = strategy.propose(&entry, pool.receipts()).unwrap().unwrap();
        assert_eq!(proposal.receipt_id, None);
        assert_eq!(proposal.status, MatchStatus::MatchedByRule);
        assert_eq!(proposal.confidence, 0.97);
        assert_eq!(proposal.note, "Tax");
        assert_eq!(proposal.rule_id.as_deref(), Some("iof"));
        assert_eq!(proposal.category.as_deref(), Some("taxes"));
    }

    #[test]
    fn test_empty_rule_set_proposes_nothing() {
        let strategy = RuleBasedStrategy::new(Arc::new(RuleSet::empty()));
        let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
        let entry = StatementEntry::debit(1, date, BigDecimal::from(3), "IOF").unwrap();
        let pool = MatchPool::new([&entry], &[]).unwrap();

        assert!(strategy.propose(&entry, pool.receipts()).unwrap().is_none());
    }
}
