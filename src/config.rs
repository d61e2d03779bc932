//! Reconciliation run configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::*;
use crate::utils::validation::is_valid_match_confidence;

/// Widest payment-date window accepted for exact matching
pub const MAX_DATE_TOLERANCE_DAYS: u32 = 10;

/// Settings for one reconciliation run
///
/// Every field has a default, so a TOML document only needs the keys it
/// overrides:
///
/// ```toml
/// strategy_order = ["exact_value_date", "rule_based"]
/// date_tolerance_days = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Strategies in the order their passes run
    pub strategy_order: Vec<StrategyId>,
    /// Symmetric, inclusive payment-date window for exact matching
    pub date_tolerance_days: u32,
    /// Proposals below this confidence are discarded before claiming
    pub min_confidence: f64,
    /// Matched results at or above this confidence count as auto-approved
    pub auto_approve_threshold: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            strategy_order: vec![StrategyId::RuleBased, StrategyId::ExactValueDate],
            date_tolerance_days: 0,
            min_confidence: 0.0,
            auto_approve_threshold: 0.90,
        }
    }
}

impl ReconciliationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> ReconciliationResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ReconciliationError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_strategy_order(mut self, order: Vec<StrategyId>) -> Self {
        self.strategy_order = order;
        self
    }

    pub fn with_date_tolerance(mut self, days: u32) -> Self {
        self.date_tolerance_days = days;
        self
    }

    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = confidence;
        self
    }

    pub fn validate(&self) -> ReconciliationResult<()> {
        if self.strategy_order.is_empty() {
            return Err(ReconciliationError::Configuration(
                "strategy_order must name at least one strategy".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for id in &self.strategy_order {
            if !seen.insert(id) {
                return Err(ReconciliationError::Configuration(format!(
                    "strategy '{}' appears more than once in strategy_order",
                    id
                )));
            }
        }

        if self.date_tolerance_days > MAX_DATE_TOLERANCE_DAYS {
            return Err(ReconciliationError::Configuration(format!(
                "date_tolerance_days must be at most {}, got {}",
                MAX_DATE_TOLERANCE_DAYS, self.date_tolerance_days
            )));
        }

        if !(self.min_confidence == 0.0 || is_valid_match_confidence(self.min_confidence)) {
            return Err(ReconciliationError::Configuration(format!(
                "min_confidence must be between 0 and 1, got {}",
                self.min_confidence
            )));
        }

        if !is_valid_match_confidence(self.auto_approve_threshold) {
            return Err(ReconciliationError::Configuration(format!(
                "auto_approve_threshold must be in (0, 1], got {}",
                self.auto_approve_threshold
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconciliationConfig::default();
        assert_eq!(
            config.strategy_order,
            vec![StrategyId::RuleBased, StrategyId::ExactValueDate]
        );
        assert_eq!(config.date_tolerance_days, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_overrides_only_given_keys() {
        let config = ReconciliationConfig::from_toml_str(
            r#"
strategy_order = ["exact_value_date", "rule_based"]
date_tolerance_days = 2
"#,
        )
        .unwrap();

        assert_eq!(config.strategy_order[0], StrategyId::ExactValueDate);
        assert_eq!(config.date_tolerance_days, 2);
        assert_eq!(config.auto_approve_threshold, 0.90);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let base = ReconciliationConfig::default();

        assert!(base.clone().with_strategy_order(vec![]).validate().is_err());
        assert!(base
            .clone()
            .with_strategy_order(vec![StrategyId::RuleBased, StrategyId::RuleBased])
            .validate()
            .is_err());
        assert!(base.clone().with_date_tolerance(11).validate().is_err());
        assert!(base.clone().with_min_confidence(1.2).validate().is_err());
        assert!(ReconciliationConfig::from_toml_str(r#"strategy_order = ["fuzzy"]"#).is_err());
    }
}
