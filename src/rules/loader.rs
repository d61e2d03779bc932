//! Rule-set loading from structured definitions
//!
//! A definition is either `{ "rules": [ ... ] }` or a bare list of rule
//! objects:
//!
//! ```json
//! {
//!   "rules": [{
//!     "id": "bank_fee_doc_ted",
//!     "name": "Tarifa DOC/TED",
//!     "active": true,
//!     "priority": 10,
//!     "conditions": [
//!       { "field": "description", "operator": "regex", "value": "TARIFA\\s+(DOC|TED)" },
//!       { "field": "amount", "operator": "between", "value": [0.01, 100.00] }
//!     ],
//!     "action": { "kind": "auto_approve", "confidence": 0.95, "note": "Bank fee" }
//!   }]
//! }
//! ```
//!
//! Validation collects every defect in the document before failing.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::rules::error::{RuleDefect, RuleRef, RuleValidationError};
use crate::rules::model::{
    condition_defects, duplicate_id_defects, Action, ActionKind, Condition, Field, Operator,
    Pattern, Predicate, Rule, RuleSet, Scalar, DEFAULT_RULE_CONFIDENCE,
};
use crate::traits::{DocumentFormat, RuleDefinitionSource, RuleDocument};
use crate::types::{EntryKind, ReconciliationResult};
use crate::utils::validation::{is_valid_match_confidence, normalize_description};

/// Load a rule set from JSON text
pub fn load_json(text: &str) -> Result<RuleSet, RuleValidationError> {
    let document: Value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
    load(&document)
}

/// Load a rule set from TOML text (`[[rules]]` array of tables, dates as strings)
pub fn load_toml(text: &str) -> Result<RuleSet, RuleValidationError> {
    let document: Value = toml::from_str(text).map_err(|e| malformed(e.to_string()))?;
    load(&document)
}

/// Load a rule set from a fetched document
pub fn load_document(document: &RuleDocument) -> Result<RuleSet, RuleValidationError> {
    match document.format {
        DocumentFormat::Json => load_json(&document.content),
        DocumentFormat::Toml => load_toml(&document.content),
    }
}

/// Fetch a definition from `source` and load it
pub async fn load_from_source<S>(source: &S, name: &str) -> ReconciliationResult<RuleSet>
where
    S: RuleDefinitionSource + ?Sized,
{
    let document = source.fetch(name).await?;
    debug!(definition = name, format = ?document.format, "Fetched rule definition");
    Ok(load_document(&document)?)
}

/// Load a rule set from an already parsed document
pub fn load(document: &Value) -> Result<RuleSet, RuleValidationError> {
    let raw_rules: &[Value] = match document {
        Value::Array(items) => items.as_slice(),
        Value::Object(root) => match root.get("rules") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                return Err(malformed(format!(
                    "'rules' must be a list, found {}",
                    json_type(other)
                )))
            }
            None => {
                warn!("Rule definition has no 'rules' collection; loading an empty rule set");
                &[]
            }
        },
        Value::Null => {
            warn!("Rule definition is empty; loading an empty rule set");
            &[]
        }
        other => {
            return Err(malformed(format!(
                "expected a list of rules or an object with 'rules', found {}",
                json_type(other)
            )))
        }
    };

    let mut defects = Vec::new();
    let mut rules = Vec::new();

    for (index, raw) in raw_rules.iter().enumerate() {
        let mut rule_defects = Vec::new();
        if let Some(rule) = parse_rule(index, raw, &mut rule_defects) {
            if rule_defects.is_empty() {
                rules.push(rule);
            }
        }
        defects.append(&mut rule_defects);
    }

    defects.extend(duplicate_id_defects(raw_rules.iter().enumerate().filter_map(
        |(i, raw)| raw.get("id").and_then(Value::as_str).map(|id| (i, id.trim())),
    )));

    if !defects.is_empty() {
        warn!(defects = defects.len(), "Rule definition rejected");
        return Err(RuleValidationError::new(defects));
    }

    let rule_set = RuleSet::from_validated(rules);
    info!(
        active = rule_set.len(),
        inactive = rule_set.inactive_count(),
        "Rule set loaded"
    );
    Ok(rule_set)
}

fn parse_rule(index: usize, raw: &Value, defects: &mut Vec<RuleDefect>) -> Option<Rule> {
    let Some(object) = raw.as_object() else {
        defects.push(RuleDefect::InvalidValue {
            rule: RuleRef::new(index, None),
            field: "rule".to_string(),
            reason: format!("expected an object, found {}", json_type(raw)),
        });
        return None;
    };

    let id = object.get("id").and_then(Value::as_str).filter(|id| !id.trim().is_empty());
    let rule_ref = RuleRef::new(index, id);

    let id = required_string(object, "id", &rule_ref, defects);
    let name = required_string(object, "name", &rule_ref, defects);

    let active = match object.get("active") {
        None => Some(true),
        Some(Value::Bool(active)) => Some(*active),
        Some(other) => {
            defects.push(invalid(&rule_ref, "active", "a boolean", other));
            None
        }
    };

    let priority = match object.get("priority") {
        None => Some(0),
        Some(value) => match value.as_i64() {
            Some(priority) => Some(priority),
            None => {
                defects.push(invalid(&rule_ref, "priority", "an integer", value));
                None
            }
        },
    };

    let conditions = match object.get("conditions") {
        None => {
            defects.push(missing(&rule_ref, "conditions"));
            None
        }
        Some(Value::Array(raw_conditions)) => {
            if raw_conditions.is_empty() {
                defects.push(RuleDefect::EmptyConditions {
                    rule: rule_ref.clone(),
                });
            }
            let parsed: Vec<Option<Condition>> = raw_conditions
                .iter()
                .enumerate()
                .map(|(position, raw)| parse_condition(&rule_ref, position, raw, defects))
                .collect();
            parsed.into_iter().collect::<Option<Vec<_>>>()
        }
        Some(other) => {
            defects.push(invalid(&rule_ref, "conditions", "a list", other));
            None
        }
    };

    let action = match object.get("action") {
        None => {
            defects.push(missing(&rule_ref, "action"));
            None
        }
        Some(raw) => parse_action(&rule_ref, raw, name.as_deref(), defects),
    };

    Some(Rule {
        id: id?,
        name: name?,
        active: active?,
        priority: priority?,
        conditions: conditions?,
        action: action?,
    })
}

fn parse_condition(
    rule: &RuleRef,
    position: usize,
    raw: &Value,
    defects: &mut Vec<RuleDefect>,
) -> Option<Condition> {
    let Some(object) = raw.as_object() else {
        defects.push(invalid(
            rule,
            &format!("conditions[{}]", position),
            "an object",
            raw,
        ));
        return None;
    };

    let missing_field = |field: &str| RuleDefect::MissingConditionField {
        rule: rule.clone(),
        condition: position,
        field: field.to_string(),
    };

    let field = match object.get("field") {
        None => {
            defects.push(missing_field("field"));
            None
        }
        Some(value) => {
            let name = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            match Field::from_str(&name) {
                Ok(field) if value.is_string() => Some(field),
                _ => {
                    defects.push(RuleDefect::UnknownField {
                        rule: rule.clone(),
                        condition: position,
                        field: name,
                    });
                    None
                }
            }
        }
    };

    let operator = match object.get("operator") {
        None => {
            defects.push(missing_field("operator"));
            None
        }
        Some(value) => {
            let name = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            match Operator::from_str(&name) {
                Ok(operator) if value.is_string() => Some(operator),
                _ => {
                    defects.push(RuleDefect::UnknownOperator {
                        rule: rule.clone(),
                        condition: position,
                        operator: name,
                    });
                    None
                }
            }
        }
    };

    let value = object.get("value");
    if value.is_none() {
        defects.push(missing_field("value"));
    }

    let (field, operator, value) = (field?, operator?, value?);

    if !operator.applies_to(field) {
        defects.push(RuleDefect::OperatorFieldMismatch {
            rule: rule.clone(),
            condition: position,
            operator: operator.to_string(),
            field: field.to_string(),
        });
        return None;
    }

    let shape_mismatch = |expected: &str| RuleDefect::ValueShapeMismatch {
        rule: rule.clone(),
        condition: position,
        operator: operator.to_string(),
        expected: expected.to_string(),
        found: value.to_string(),
    };

    let predicate = match operator {
        Operator::Eq
        | Operator::Neq
        | Operator::Gt
        | Operator::Gte
        | Operator::Lt
        | Operator::Lte => {
            let Some(scalar) = parse_scalar(field, value) else {
                defects.push(shape_mismatch(scalar_expectation(field)));
                return None;
            };
            match operator {
                Operator::Eq => Predicate::Eq(scalar),
                Operator::Neq => Predicate::Neq(scalar),
                Operator::Gt => Predicate::Gt(scalar),
                Operator::Gte => Predicate::Gte(scalar),
                Operator::Lt => Predicate::Lt(scalar),
                _ => Predicate::Lte(scalar),
            }
        }
        Operator::Between => {
            let bounds = match value.as_array() {
                Some(items) if items.len() == 2 => {
                    parse_scalar(field, &items[0]).zip(parse_scalar(field, &items[1]))
                }
                _ => None,
            };
            let Some((low, high)) = bounds else {
                defects.push(shape_mismatch(&format!(
                    "a list of exactly two {} bounds",
                    field
                )));
                return None;
            };
            Predicate::Between { low, high }
        }
        Operator::Regex => {
            let Some(source) = value.as_str() else {
                defects.push(shape_mismatch("a pattern string"));
                return None;
            };
            match Pattern::new(source) {
                Ok(pattern) => Predicate::Regex(pattern),
                Err(e) => {
                    defects.push(RuleDefect::InvalidPattern {
                        rule: rule.clone(),
                        condition: position,
                        reason: e.to_string(),
                    });
                    return None;
                }
            }
        }
        Operator::Contains | Operator::NotContains => {
            let Some(needles) = parse_needles(value) else {
                defects.push(shape_mismatch("a string or a list of strings"));
                return None;
            };
            if operator == Operator::Contains {
                Predicate::Contains(needles)
            } else {
                Predicate::NotContains(needles)
            }
        }
        Operator::In | Operator::NotIn => {
            let set = value.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|item| parse_scalar(field, item))
                    .collect::<Option<Vec<_>>>()
            });
            let Some(set) = set else {
                defects.push(shape_mismatch(&format!("a list of {} values", field)));
                return None;
            };
            if operator == Operator::In {
                Predicate::In(set)
            } else {
                Predicate::NotIn(set)
            }
        }
    };

    let condition = Condition::new(field, predicate);
    let semantic = condition_defects(&condition, rule, position);
    if semantic.is_empty() {
        Some(condition)
    } else {
        defects.extend(semantic);
        None
    }
}

fn parse_action(
    rule: &RuleRef,
    raw: &Value,
    rule_name: Option<&str>,
    defects: &mut Vec<RuleDefect>,
) -> Option<Action> {
    let Some(object) = raw.as_object() else {
        defects.push(invalid(rule, "action", "an object", raw));
        return None;
    };

    // `type` is the older spelling of `kind`
    let kind = match object.get("kind").or_else(|| object.get("type")) {
        None => {
            defects.push(missing(rule, "action.kind"));
            None
        }
        Some(value) => {
            let name = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            match ActionKind::from_str(&name) {
                Ok(kind) => Some(kind),
                Err(_) => {
                    defects.push(RuleDefect::UnknownActionKind {
                        rule: rule.clone(),
                        kind: name,
                    });
                    None
                }
            }
        }
    };

    let confidence = match object.get("confidence") {
        None => Some(DEFAULT_RULE_CONFIDENCE),
        Some(value) => match value.as_f64() {
            Some(confidence) if is_valid_match_confidence(confidence) => Some(confidence),
            Some(confidence) => {
                defects.push(RuleDefect::InvalidConfidence {
                    rule: rule.clone(),
                    confidence,
                });
                None
            }
            None => {
                defects.push(invalid(rule, "action.confidence", "a number", value));
                None
            }
        },
    };

    let note = optional_string(object, "note", "action.note", rule, defects);
    let category = optional_string(object, "category", "action.category", rule, defects);

    Some(Action {
        kind: kind?,
        confidence: confidence?,
        note: note?.unwrap_or_else(|| {
            format!("Auto-approved by rule: {}", rule_name.unwrap_or("unnamed"))
        }),
        category: category?,
    })
}

/// Literal typed after the field it will be compared with
fn parse_scalar(field: Field, value: &Value) -> Option<Scalar> {
    match field {
        Field::Amount => {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.trim().to_string(),
                _ => return None,
            };
            BigDecimal::from_str(&text).ok().map(Scalar::Amount)
        }
        Field::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(Scalar::Date),
        Field::Description => value
            .as_str()
            .map(|s| Scalar::Text(normalize_description(s))),
        Field::Kind => value
            .as_str()
            .and_then(|s| EntryKind::from_str(s).ok())
            .map(Scalar::Kind),
    }
}

fn scalar_expectation(field: Field) -> &'static str {
    match field {
        Field::Amount => "a decimal amount",
        Field::Date => "a date formatted as YYYY-MM-DD",
        Field::Description => "a string",
        Field::Kind => "DEBIT or CREDIT",
    }
}

fn parse_needles(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![normalize_description(s)]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(normalize_description))
            .collect(),
        _ => None,
    }
}

fn required_string(
    object: &Map<String, Value>,
    key: &str,
    rule: &RuleRef,
    defects: &mut Vec<RuleDefect>,
) -> Option<String> {
    match object.get(key) {
        None | Some(Value::Null) => {
            defects.push(missing(rule, key));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            defects.push(RuleDefect::InvalidValue {
                rule: rule.clone(),
                field: key.to_string(),
                reason: "must not be empty".to_string(),
            });
            None
        }
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            defects.push(invalid(rule, key, "a string", other));
            None
        }
    }
}

/// `Some(None)` when absent, `None` when present with the wrong type
fn optional_string(
    object: &Map<String, Value>,
    key: &str,
    label: &str,
    rule: &RuleRef,
    defects: &mut Vec<RuleDefect>,
) -> Option<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(other) => {
            defects.push(invalid(rule, label, "a string", other));
            None
        }
    }
}

fn missing(rule: &RuleRef, field: &str) -> RuleDefect {
    RuleDefect::MissingField {
        rule: rule.clone(),
        field: field.to_string(),
    }
}

fn invalid(rule: &RuleRef, field: &str, expected: &str, found: &Value) -> RuleDefect {
    RuleDefect::InvalidValue {
        rule: rule.clone(),
        field: field.to_string(),
        reason: format!("expected {}, found {}", expected, json_type(found)),
    }
}

fn malformed(reason: String) -> RuleValidationError {
    RuleValidationError::new(vec![RuleDefect::MalformedDocument(reason)])
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fee_rule(id: &str, priority: i64) -> Value {
        json!({
            "id": id,
            "name": "Tarifa DOC/TED",
            "priority": priority,
            "conditions": [
                { "field": "description", "operator": "regex", "value": "(?i)TARIFA\\s+(DOC|TED)" },
                { "field": "amount", "operator": "between", "value": [0.01, 100.00] }
            ],
            "action": { "kind": "auto_approve", "confidence": 0.95, "note": "Bank fee" }
        })
    }

    #[test]
    fn test_load_valid_rule_set() {
        let set = load(&json!({ "rules": [fee_rule("fee", 10)] })).unwrap();

        assert_eq!(set.len(), 1);
        let rule = &set.rules()[0];
        assert_eq!(rule.id, "fee");
        assert!(rule.active);
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.action.kind, ActionKind::AutoApprove);
        assert_eq!(rule.action.confidence, 0.95);
        assert_eq!(rule.action.note, "Bank fee");
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let set = load(&json!([{
            "id": "pix",
            "name": "Tarifa PIX",
            "conditions": [{ "field": "description", "operator": "contains", "value": "tarifa pix" }],
            "action": { "type": "AUTO_APPROVE" }
        }]))
        .unwrap();

        let rule = &set.rules()[0];
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.action.confidence, DEFAULT_RULE_CONFIDENCE);
        assert_eq!(rule.action.note, "Auto-approved by rule: Tarifa PIX");
        assert_eq!(
            rule.conditions[0].predicate,
            Predicate::Contains(vec!["TARIFA PIX".to_string()])
        );
    }

    #[test]
    fn test_inactive_rules_are_counted_not_loaded() {
        let mut inactive = fee_rule("off", 1);
        inactive["active"] = json!(false);

        let set = load(&json!({ "rules": [fee_rule("on", 5), inactive] })).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.inactive_count(), 1);
        assert!(set.get("off").is_none());
    }

    #[test]
    fn test_inactive_rules_are_still_validated() {
        let error = load(&json!([{
            "id": "off",
            "name": "Off",
            "active": false,
            "conditions": [],
            "action": { "kind": "auto_approve" }
        }]))
        .unwrap_err();

        assert!(matches!(
            error.defects()[0],
            RuleDefect::EmptyConditions { .. }
        ));
    }

    #[test]
    fn test_collects_every_defect() {
        let error = load(&json!({ "rules": [
            { "name": "No id", "conditions": [{ "field": "amount", "operator": "eq", "value": 1 }], "action": { "kind": "auto_approve" } },
            { "id": "bad_op", "name": "Bad", "conditions": [{ "field": "amount", "operator": "like", "value": 1 }], "action": { "kind": "auto_approve" } },
            { "id": "bad_range", "name": "Range", "conditions": [{ "field": "amount", "operator": "between", "value": [100, 10] }], "action": { "kind": "auto_approve" } },
            { "id": "bad_conf", "name": "Conf", "conditions": [{ "field": "kind", "operator": "in", "value": ["DEBIT"] }], "action": { "kind": "auto_approve", "confidence": 1.5 } },
            { "id": "empty", "name": "Empty", "conditions": [], "action": { "kind": "suggest" } }
        ]}))
        .unwrap_err();

        let defects = error.defects();
        assert!(defects.contains(&RuleDefect::MissingField {
            rule: RuleRef::new(0, None),
            field: "id".to_string(),
        }));
        assert!(defects.iter().any(|d| matches!(d, RuleDefect::UnknownOperator { operator, .. } if operator == "like")));
        assert!(defects.iter().any(|d| matches!(d, RuleDefect::InvalidRange { rule, .. } if rule.id.as_deref() == Some("bad_range"))));
        assert!(defects.iter().any(|d| matches!(d, RuleDefect::InvalidConfidence { .. })));
        assert!(defects.iter().any(|d| matches!(d, RuleDefect::EmptyConditions { .. })));
        assert!(defects.iter().any(|d| matches!(d, RuleDefect::UnknownActionKind { kind, .. } if kind == "suggest")));
        assert_eq!(defects.len(), 6);
    }

    #[test]
    fn test_operator_arity_and_field_checks() {
        let error = load(&json!([{
            "id": "shapes",
            "name": "Shapes",
            "conditions": [
                { "field": "amount", "operator": "between", "value": [1] },
                { "field": "description", "operator": "gt", "value": "A" },
                { "field": "amount", "operator": "regex", "value": "1" },
                { "field": "date", "operator": "eq", "value": "02/11/2025" },
                { "field": "description", "operator": "regex", "value": "(unclosed" },
                { "field": "payee", "operator": "eq", "value": "X" },
                { "field": "kind", "operator": "in", "value": "DEBIT" }
            ],
            "action": { "kind": "auto_approve" }
        }]))
        .unwrap_err();

        let defects = error.defects();
        assert_eq!(defects.len(), 7);
        assert!(matches!(defects[0], RuleDefect::ValueShapeMismatch { condition: 0, .. }));
        assert!(matches!(defects[1], RuleDefect::OperatorFieldMismatch { condition: 1, .. }));
        assert!(matches!(defects[2], RuleDefect::OperatorFieldMismatch { condition: 2, .. }));
        assert!(matches!(defects[3], RuleDefect::ValueShapeMismatch { condition: 3, .. }));
        assert!(matches!(defects[4], RuleDefect::InvalidPattern { condition: 4, .. }));
        assert!(matches!(defects[5], RuleDefect::UnknownField { condition: 5, .. }));
        assert!(matches!(defects[6], RuleDefect::ValueShapeMismatch { condition: 6, .. }));
    }

    #[test]
    fn test_duplicate_id_reported_once() {
        let error = load(&json!({ "rules": [
            fee_rule("tarifa_pix", 1),
            fee_rule("tarifa_pix", 2)
        ]}))
        .unwrap_err();

        assert_eq!(error.defects().len(), 1);
        let conflicts = error.conflicts();
        assert_eq!(conflicts[0].id, "tarifa_pix");
        assert_eq!(conflicts[0].positions, vec![0, 1]);
        assert_eq!(error.to_string().matches("tarifa_pix").count(), 1);
    }

    #[test]
    fn test_padded_duplicate_id_conflicts() {
        let error = load(&json!({ "rules": [
            fee_rule("tarifa_pix", 1),
            fee_rule(" tarifa_pix ", 2)
        ]}))
        .unwrap_err();

        assert_eq!(error.defects().len(), 1);
        let conflicts = error.conflicts();
        assert_eq!(conflicts[0].id, "tarifa_pix");
        assert_eq!(conflicts[0].positions, vec![0, 1]);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            load_json("{ invalid json").unwrap_err().defects()[0],
            RuleDefect::MalformedDocument(_)
        ));
        assert!(load(&json!({ "rules": "nope" })).is_err());
        assert!(load(&json!(42)).is_err());
        assert!(load(&json!({ "other": 1 })).unwrap().is_empty());
        assert!(load(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_load_toml() {
        let set = load_toml(
            r#"
[[rules]]
id = "iof"
name = "IOF"
priority = 3

[[rules.conditions]]
field = "description"
operator = "contains"
value = ["IOF", "IMPOSTO"]

[[rules.conditions]]
field = "date"
operator = "gte"
value = "2025-01-01"

[rules.action]
kind = "auto_approve"
confidence = 0.9
category = "taxes"
"#,
        )
        .unwrap();

        let rule = set.get("iof").unwrap();
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.action.category.as_deref(), Some("taxes"));
    }
}
