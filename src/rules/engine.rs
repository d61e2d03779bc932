//! Rule evaluation against statement entries

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::cmp::Ordering;
use tracing::debug;

use crate::rules::model::{Condition, Field, Predicate, Rule, RuleSet, Scalar};
use crate::types::{EntryKind, EvaluationError, StatementEntry};

/// Borrowed view of one entry attribute
#[derive(Debug, Clone, Copy)]
enum FieldValue<'a> {
    Amount(&'a BigDecimal),
    Date(NaiveDate),
    Text(&'a str),
    Kind(EntryKind),
}

fn field_value(entry: &StatementEntry, field: Field) -> Option<FieldValue<'_>> {
    match field {
        Field::Amount => Some(FieldValue::Amount(&entry.amount)),
        Field::Date => Some(FieldValue::Date(entry.date)),
        Field::Description => entry.description_text().map(FieldValue::Text),
        Field::Kind => Some(FieldValue::Kind(entry.kind)),
    }
}

/// First active rule, in rule-set order, whose conditions all hold for `entry`
pub fn evaluate<'r>(
    rule_set: &'r RuleSet,
    entry: &StatementEntry,
) -> Result<Option<&'r Rule>, EvaluationError> {
    for rule in rule_set.rules() {
        if evaluate_rule(rule, entry)? {
            debug!(entry_id = %entry.id, rule_id = %rule.id, priority = rule.priority, "Rule matched");
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

/// All conditions of `rule`, AND-combined and short-circuited left to right
pub fn evaluate_rule(rule: &Rule, entry: &StatementEntry) -> Result<bool, EvaluationError> {
    for condition in &rule.conditions {
        if !evaluate_condition(condition, entry)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A condition on a field the entry lacks is simply false
pub fn evaluate_condition(
    condition: &Condition,
    entry: &StatementEntry,
) -> Result<bool, EvaluationError> {
    let Some(value) = field_value(entry, condition.field) else {
        return Ok(false);
    };

    let cmp = |operand: &Scalar| compare(value, operand, condition);

    let holds = match &condition.predicate {
        Predicate::Eq(operand) => cmp(operand)? == Ordering::Equal,
        Predicate::Neq(operand) => cmp(operand)? != Ordering::Equal,
        Predicate::Gt(operand) => cmp(operand)? == Ordering::Greater,
        Predicate::Gte(operand) => cmp(operand)? != Ordering::Less,
        Predicate::Lt(operand) => cmp(operand)? == Ordering::Less,
        Predicate::Lte(operand) => cmp(operand)? != Ordering::Greater,
        Predicate::Between { low, high } => {
            cmp(low)? != Ordering::Less && cmp(high)? != Ordering::Greater
        }
        Predicate::Regex(pattern) => pattern.is_match(text_of(value, condition, "pattern")?),
        Predicate::Contains(needles) => contains_any(text_of(value, condition, "text")?, needles),
        Predicate::NotContains(needles) => {
            !contains_any(text_of(value, condition, "text")?, needles)
        }
        Predicate::In(set) => member_of(set, &cmp)?,
        Predicate::NotIn(set) => !member_of(set, &cmp)?,
    };

    Ok(holds)
}

fn member_of<F>(set: &[Scalar], cmp: F) -> Result<bool, EvaluationError>
where
    F: Fn(&Scalar) -> Result<Ordering, EvaluationError>,
{
    for operand in set {
        if cmp(operand)? == Ordering::Equal {
            return Ok(true);
        }
    }
    Ok(false)
}

fn contains_any(text: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| text.contains(needle.to_uppercase().as_str()))
}

fn text_of<'a>(
    value: FieldValue<'a>,
    condition: &Condition,
    operand: &str,
) -> Result<&'a str, EvaluationError> {
    match value {
        FieldValue::Text(text) => Ok(text),
        _ => Err(mismatch(condition, operand)),
    }
}

/// Descriptions are stored upper-cased, so text operands are folded the same way
fn compare(
    value: FieldValue<'_>,
    operand: &Scalar,
    condition: &Condition,
) -> Result<Ordering, EvaluationError> {
    match (value, operand) {
        (FieldValue::Amount(a), Scalar::Amount(b)) => Ok(a.cmp(b)),
        (FieldValue::Date(a), Scalar::Date(b)) => Ok(a.cmp(b)),
        (FieldValue::Text(a), Scalar::Text(b)) => Ok(a.cmp(b.to_uppercase().as_str())),
        (FieldValue::Kind(a), Scalar::Kind(b)) => Ok(a.cmp(b)),
        (_, operand) => Err(mismatch(condition, operand.type_name())),
    }
}

fn mismatch(condition: &Condition, found: &str) -> EvaluationError {
    EvaluationError::TypeMismatch {
        field: condition.field.to_string(),
        operator: condition.operator().to_string(),
        found: found.to_string(),
    }
}
