//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::*;

/// Number of fraction digits statement amounts are carried with
pub const AMOUNT_SCALE: i64 = 2;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ReconciliationResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ReconciliationError::InvalidRecord(format!(
            "Amount must be positive, got {}",
            amount
        )))
    } else {
        Ok(())
    }
}

/// Validate that an amount fits the two-digit fixed-point representation
pub fn validate_amount_scale(amount: &BigDecimal) -> ReconciliationResult<()> {
    if has_valid_scale(amount) {
        Ok(())
    } else {
        Err(ReconciliationError::InvalidRecord(format!(
            "Amount {} has more than {} fraction digits",
            amount, AMOUNT_SCALE
        )))
    }
}

/// Trailing zeros do not count: `15.000` is a valid two-digit amount
pub fn has_valid_scale(amount: &BigDecimal) -> bool {
    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    scale <= AMOUNT_SCALE
}

/// Validate an OCR extraction confidence, which may be zero
pub fn validate_extraction_confidence(confidence: f64) -> ReconciliationResult<()> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(ReconciliationError::InvalidRecord(format!(
            "Extraction confidence must be between 0 and 1, got {}",
            confidence
        )))
    }
}

/// Match confidences live in (0, 1]
pub fn is_valid_match_confidence(confidence: f64) -> bool {
    confidence.is_finite() && confidence > 0.0 && confidence <= 1.0
}

/// Upper-case and collapse runs of whitespace
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_amount_scale() {
        assert!(has_valid_scale(&BigDecimal::from_str("15.00").unwrap()));
        assert!(has_valid_scale(&BigDecimal::from_str("15.000").unwrap()));
        assert!(has_valid_scale(&BigDecimal::from(100)));
        assert!(!has_valid_scale(&BigDecimal::from_str("15.005").unwrap()));
    }

    #[test]
    fn test_positive_amount() {
        assert!(validate_positive_amount(&BigDecimal::from_str("0.01").unwrap()).is_ok());
        assert!(validate_positive_amount(&BigDecimal::from(0)).is_err());
        assert!(validate_positive_amount(&BigDecimal::from(-5)).is_err());
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(
            normalize_description("  tarifa   doc/ted\tref 123 "),
            "TARIFA DOC/TED REF 123"
        );
        assert_eq!(normalize_description("   "), "");
    }

    #[test]
    fn test_confidence_ranges() {
        assert!(is_valid_match_confidence(1.0));
        assert!(is_valid_match_confidence(0.01));
        assert!(!is_valid_match_confidence(0.0));
        assert!(!is_valid_match_confidence(1.5));
        assert!(!is_valid_match_confidence(f64::NAN));

        assert!(validate_extraction_confidence(0.0).is_ok());
        assert!(validate_extraction_confidence(-0.1).is_err());
    }
}
