//! Load-time defects of a rule-set definition

use std::fmt;

/// Points at a rule inside a definition, by position and (when known) id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub index: usize,
    pub id: Option<String>,
}

impl RuleRef {
    pub fn new(index: usize, id: Option<&str>) -> Self {
        Self {
            index,
            id: id.map(str::to_string),
        }
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "rule '{}' (#{})", id, self.index),
            None => write!(f, "rule #{}", self.index),
        }
    }
}

/// Two or more rules share the same id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule conflict: id '{id}' is declared by rules {}", format_positions(.positions))]
pub struct RuleConflictError {
    pub id: String,
    /// Position of every rule carrying the id, in document order
    pub positions: Vec<usize>,
}

fn format_positions(positions: &[usize]) -> String {
    positions
        .iter()
        .map(|p| format!("#{}", p))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single structural problem found while loading rules
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleDefect {
    #[error("malformed rule document: {0}")]
    MalformedDocument(String),
    #[error("{rule}: missing required field '{field}'")]
    MissingField { rule: RuleRef, field: String },
    #[error("{rule}: field '{field}' is invalid: {reason}")]
    InvalidValue {
        rule: RuleRef,
        field: String,
        reason: String,
    },
    #[error("{rule}, condition #{condition}: missing required field '{field}'")]
    MissingConditionField {
        rule: RuleRef,
        condition: usize,
        field: String,
    },
    #[error("{rule}, condition #{condition}: unknown field '{field}'")]
    UnknownField {
        rule: RuleRef,
        condition: usize,
        field: String,
    },
    #[error("{rule}, condition #{condition}: unknown operator '{operator}'")]
    UnknownOperator {
        rule: RuleRef,
        condition: usize,
        operator: String,
    },
    #[error("{rule}, condition #{condition}: operator '{operator}' cannot be applied to field '{field}'")]
    OperatorFieldMismatch {
        rule: RuleRef,
        condition: usize,
        operator: String,
        field: String,
    },
    #[error("{rule}, condition #{condition}: operator '{operator}' expects {expected}, got {found}")]
    ValueShapeMismatch {
        rule: RuleRef,
        condition: usize,
        operator: String,
        expected: String,
        found: String,
    },
    #[error("{rule}, condition #{condition}: invalid range [{low}, {high}], lower bound is greater than upper bound")]
    InvalidRange {
        rule: RuleRef,
        condition: usize,
        low: String,
        high: String,
    },
    #[error("{rule}, condition #{condition}: invalid regex pattern: {reason}")]
    InvalidPattern {
        rule: RuleRef,
        condition: usize,
        reason: String,
    },
    #[error("{rule}: conditions must not be empty")]
    EmptyConditions { rule: RuleRef },
    #[error("{rule}: action confidence {confidence} is outside (0, 1]")]
    InvalidConfidence { rule: RuleRef, confidence: f64 },
    #[error("{rule}: unknown action kind '{kind}'")]
    UnknownActionKind { rule: RuleRef, kind: String },
    #[error(transparent)]
    Conflict(#[from] RuleConflictError),
}

impl RuleDefect {
    /// Position of the offending rule, if the defect belongs to one rule
    pub fn rule(&self) -> Option<&RuleRef> {
        match self {
            RuleDefect::MissingField { rule, .. }
            | RuleDefect::InvalidValue { rule, .. }
            | RuleDefect::MissingConditionField { rule, .. }
            | RuleDefect::UnknownField { rule, .. }
            | RuleDefect::UnknownOperator { rule, .. }
            | RuleDefect::OperatorFieldMismatch { rule, .. }
            | RuleDefect::ValueShapeMismatch { rule, .. }
            | RuleDefect::InvalidRange { rule, .. }
            | RuleDefect::InvalidPattern { rule, .. }
            | RuleDefect::EmptyConditions { rule }
            | RuleDefect::InvalidConfidence { rule, .. }
            | RuleDefect::UnknownActionKind { rule, .. } => Some(rule),
            RuleDefect::MalformedDocument(_) | RuleDefect::Conflict(_) => None,
        }
    }
}

/// Every defect found in a rule-set definition
///
/// Loading never stops at the first problem, so this carries the complete list.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleValidationError {
    defects: Vec<RuleDefect>,
}

impl RuleValidationError {
    pub fn new(defects: Vec<RuleDefect>) -> Self {
        Self { defects }
    }

    pub fn defects(&self) -> &[RuleDefect] {
        &self.defects
    }

    pub fn into_defects(self) -> Vec<RuleDefect> {
        self.defects
    }

    /// Duplicate-id conflicts among the defects
    pub fn conflicts(&self) -> Vec<&RuleConflictError> {
        self.defects
            .iter()
            .filter_map(|d| match d {
                RuleDefect::Conflict(conflict) => Some(conflict),
                _ => None,
            })
            .collect()
    }

    pub fn has_conflicts(&self) -> bool {
        self.defects
            .iter()
            .any(|d| matches!(d, RuleDefect::Conflict(_)))
    }
}

impl fmt::Display for RuleValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rule validation failed with {} defect(s):",
            self.defects.len()
        )?;
        for (i, defect) in self.defects.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, defect)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuleValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_lists_every_position() {
        let conflict = RuleConflictError {
            id: "tarifa_pix".to_string(),
            positions: vec![0, 3],
        };
        assert_eq!(
            conflict.to_string(),
            "rule conflict: id 'tarifa_pix' is declared by rules #0, #3"
        );
    }

    #[test]
    fn test_validation_error_lists_all_defects() {
        let error = RuleValidationError::new(vec![
            RuleDefect::EmptyConditions {
                rule: RuleRef::new(1, Some("empty")),
            },
            RuleConflictError {
                id: "dup".to_string(),
                positions: vec![2, 4],
            }
            .into(),
        ]);

        let message = error.to_string();
        assert!(message.starts_with("Rule validation failed with 2 defect(s):"));
        assert!(message.contains("rule 'empty' (#1): conditions must not be empty"));
        assert!(message.contains("id 'dup'"));
        assert!(error.has_conflicts());
        assert_eq!(error.conflicts().len(), 1);
    }

    #[test]
    fn test_rule_ref_without_id() {
        assert_eq!(RuleRef::new(5, None).to_string(), "rule #5");
    }
}
