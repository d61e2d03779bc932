//! Typed representation of declarative matching rules

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::rules::error::{RuleConflictError, RuleDefect, RuleRef, RuleValidationError};
use crate::types::EntryKind;
use crate::utils::validation::is_valid_match_confidence;

/// Confidence applied when a rule action does not state one
pub const DEFAULT_RULE_CONFIDENCE: f64 = 0.85;

/// Statement entry attribute a condition inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Amount,
    Date,
    Description,
    Kind,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Amount => "amount",
            Field::Date => "date",
            Field::Description => "description",
            Field::Kind => "kind",
        }
    }

    /// Amount and date support ordering comparisons
    pub fn is_ordered(&self) -> bool {
        matches!(self, Field::Amount | Field::Date)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amount" => Ok(Field::Amount),
            "date" => Ok(Field::Date),
            "description" => Ok(Field::Description),
            "kind" => Ok(Field::Kind),
            other => Err(other.to_string()),
        }
    }
}

/// Comparison operator named in a rule definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    Regex,
    Contains,
    NotContains,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Between => "between",
            Operator::Regex => "regex",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }

    /// Whether the operator may be applied to `field`
    pub fn applies_to(&self, field: Field) -> bool {
        match self {
            Operator::Eq | Operator::Neq => true,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Between => {
                field.is_ordered()
            }
            Operator::Regex | Operator::Contains | Operator::NotContains => {
                field == Field::Description
            }
            Operator::In | Operator::NotIn => {
                matches!(field, Field::Description | Field::Kind)
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Accepts the short names plus the long-form spellings older rule files use
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "equals" => Ok(Operator::Eq),
            "neq" | "not_equals" => Ok(Operator::Neq),
            "gt" | "greater_than" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "lt" | "less_than" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "between" => Ok(Operator::Between),
            "regex" => Ok(Operator::Regex),
            "contains" => Ok(Operator::Contains),
            "not_contains" => Ok(Operator::NotContains),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            other => Err(other.to_string()),
        }
    }
}

/// A literal operand, typed after the field it is compared with
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Amount(BigDecimal),
    Date(NaiveDate),
    Text(String),
    Kind(EntryKind),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Amount(_) => "amount",
            Scalar::Date(_) => "date",
            Scalar::Text(_) => "text",
            Scalar::Kind(_) => "kind",
        }
    }

    /// Whether this operand has the type `field` values have
    pub fn fits(&self, field: Field) -> bool {
        matches!(
            (self, field),
            (Scalar::Amount(_), Field::Amount)
                | (Scalar::Date(_), Field::Date)
                | (Scalar::Text(_), Field::Description)
                | (Scalar::Kind(_), Field::Kind)
        )
    }

    /// Ordering between two operands of the same type
    pub fn partial_cmp_same(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Amount(a), Scalar::Amount(b)) => Some(a.cmp(b)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Kind(a), Scalar::Kind(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Amount(amount) => write!(f, "{}", amount),
            Scalar::Date(date) => write!(f, "{}", date),
            Scalar::Text(text) => write!(f, "\"{}\"", text),
            Scalar::Kind(kind) => write!(f, "{}", kind),
        }
    }
}

/// Compiled case-insensitive regular expression, remembering its source
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source).case_insensitive(true).build()?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Partial match anywhere in `text`
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Operator together with its operand, one variant per operator shape
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Scalar),
    Neq(Scalar),
    Gt(Scalar),
    Gte(Scalar),
    Lt(Scalar),
    Lte(Scalar),
    /// Inclusive on both ends
    Between { low: Scalar, high: Scalar },
    Regex(Pattern),
    /// Matches when any needle occurs in the value
    Contains(Vec<String>),
    NotContains(Vec<String>),
    In(Vec<Scalar>),
    NotIn(Vec<Scalar>),
}

impl Predicate {
    pub fn operator(&self) -> Operator {
        match self {
            Predicate::Eq(_) => Operator::Eq,
            Predicate::Neq(_) => Operator::Neq,
            Predicate::Gt(_) => Operator::Gt,
            Predicate::Gte(_) => Operator::Gte,
            Predicate::Lt(_) => Operator::Lt,
            Predicate::Lte(_) => Operator::Lte,
            Predicate::Between { .. } => Operator::Between,
            Predicate::Regex(_) => Operator::Regex,
            Predicate::Contains(_) => Operator::Contains,
            Predicate::NotContains(_) => Operator::NotContains,
            Predicate::In(_) => Operator::In,
            Predicate::NotIn(_) => Operator::NotIn,
        }
    }

    fn scalars(&self) -> Vec<&Scalar> {
        match self {
            Predicate::Eq(s)
            | Predicate::Neq(s)
            | Predicate::Gt(s)
            | Predicate::Gte(s)
            | Predicate::Lt(s)
            | Predicate::Lte(s) => vec![s],
            Predicate::Between { low, high } => vec![low, high],
            Predicate::In(set) | Predicate::NotIn(set) => set.iter().collect(),
            Predicate::Regex(_) | Predicate::Contains(_) | Predicate::NotContains(_) => Vec::new(),
        }
    }
}

/// One test against a statement entry field
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: Field,
    pub predicate: Predicate,
}

impl Condition {
    pub fn new(field: Field, predicate: Predicate) -> Self {
        Self { field, predicate }
    }

    pub fn operator(&self) -> Operator {
        self.predicate.operator()
    }
}

/// What happens to an entry a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    AutoApprove,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::AutoApprove => "auto_approve",
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto_approve" => Ok(ActionKind::AutoApprove),
            other => Err(other.to_string()),
        }
    }
}

/// Result attached to a satisfied rule
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Confidence in (0, 1] given to the resulting match
    pub confidence: f64,
    /// Audit note copied onto the match
    pub note: String,
    /// Optional bookkeeping category
    pub category: Option<String>,
}

impl Action {
    pub fn auto_approve(confidence: f64, note: &str) -> Self {
        Self {
            kind: ActionKind::AutoApprove,
            confidence,
            note: note.to_string(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

/// Declarative condition-action pair
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Lower values are evaluated first
    pub priority: i64,
    /// AND-combined, evaluated left to right
    pub conditions: Vec<Condition>,
    pub action: Action,
}

impl Rule {
    pub fn new(
        id: &str,
        name: &str,
        priority: i64,
        conditions: Vec<Condition>,
        action: Action,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            active: true,
            priority,
            conditions,
            action,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Active rules in evaluation order
///
/// Sorted by priority ascending with the id as tie-break. Inactive rules are
/// validated but only counted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    inactive_count: usize,
}

/// Diagnostic view of a loaded rule set
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSetSummary {
    pub active: usize,
    pub inactive: usize,
    /// (id, priority) in evaluation order
    pub order: Vec<(String, i64)>,
}

impl RuleSet {
    /// Validate typed rules and build the evaluation order
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleValidationError> {
        let mut defects: Vec<RuleDefect> = rules
            .iter()
            .enumerate()
            .flat_map(|(index, rule)| rule_defects(rule, index))
            .collect();
        defects.extend(duplicate_id_defects(
            rules.iter().enumerate().map(|(i, r)| (i, r.id.as_str())),
        ));

        if defects.is_empty() {
            Ok(Self::from_validated(rules))
        } else {
            Err(RuleValidationError::new(defects))
        }
    }

    /// Rule set that matches nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_validated(rules: Vec<Rule>) -> Self {
        let total = rules.len();
        let mut active: Vec<Rule> = rules.into_iter().filter(|r| r.active).collect();
        active.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        let inactive_count = total - active.len();
        Self {
            rules: active,
            inactive_count,
        }
    }

    /// Active rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules that were parsed but left out because they are inactive
    pub fn inactive_count(&self) -> usize {
        self.inactive_count
    }

    /// Every rule the definition declared, active or not
    pub fn total_count(&self) -> usize {
        self.rules.len() + self.inactive_count
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn summary(&self) -> RuleSetSummary {
        RuleSetSummary {
            active: self.rules.len(),
            inactive: self.inactive_count,
            order: self
                .rules
                .iter()
                .map(|r| (r.id.clone(), r.priority))
                .collect(),
        }
    }
}

/// Semantic checks on one typed rule
pub(crate) fn rule_defects(rule: &Rule, index: usize) -> Vec<RuleDefect> {
    let id = (!rule.id.trim().is_empty()).then_some(rule.id.as_str());
    let rule_ref = RuleRef::new(index, id);
    let mut defects = Vec::new();

    if rule.id.trim().is_empty() {
        defects.push(RuleDefect::MissingField {
            rule: rule_ref.clone(),
            field: "id".to_string(),
        });
    }
    if rule.name.trim().is_empty() {
        defects.push(RuleDefect::MissingField {
            rule: rule_ref.clone(),
            field: "name".to_string(),
        });
    }
    if rule.conditions.is_empty() {
        defects.push(RuleDefect::EmptyConditions {
            rule: rule_ref.clone(),
        });
    }

    for (position, condition) in rule.conditions.iter().enumerate() {
        defects.extend(condition_defects(condition, &rule_ref, position));
    }

    if !is_valid_match_confidence(rule.action.confidence) {
        defects.push(RuleDefect::InvalidConfidence {
            rule: rule_ref,
            confidence: rule.action.confidence,
        });
    }

    defects
}

pub(crate) fn condition_defects(
    condition: &Condition,
    rule: &RuleRef,
    position: usize,
) -> Vec<RuleDefect> {
    let operator = condition.operator();
    let field = condition.field;

    // Shape checks are meaningless once the pairing itself is wrong
    if !operator.applies_to(field) {
        return vec![RuleDefect::OperatorFieldMismatch {
            rule: rule.clone(),
            condition: position,
            operator: operator.to_string(),
            field: field.to_string(),
        }];
    }

    let mut defects = Vec::new();

    for scalar in condition.predicate.scalars() {
        if !scalar.fits(field) {
            defects.push(RuleDefect::ValueShapeMismatch {
                rule: rule.clone(),
                condition: position,
                operator: operator.to_string(),
                expected: format!("a {} value", field),
                found: format!("{} {}", scalar.type_name(), scalar),
            });
        }
    }

    match &condition.predicate {
        Predicate::Between { low, high } => {
            if low.partial_cmp_same(high) == Some(Ordering::Greater) {
                defects.push(RuleDefect::InvalidRange {
                    rule: rule.clone(),
                    condition: position,
                    low: low.to_string(),
                    high: high.to_string(),
                });
            }
        }
        Predicate::In(set) | Predicate::NotIn(set) if set.is_empty() => {
            defects.push(RuleDefect::ValueShapeMismatch {
                rule: rule.clone(),
                condition: position,
                operator: operator.to_string(),
                expected: "a non-empty list".to_string(),
                found: "an empty list".to_string(),
            });
        }
        Predicate::Contains(needles) | Predicate::NotContains(needles)
            if needles.is_empty() || needles.iter().any(|n| n.is_empty()) =>
        {
            defects.push(RuleDefect::ValueShapeMismatch {
                rule: rule.clone(),
                condition: position,
                operator: operator.to_string(),
                expected: "non-empty text".to_string(),
                found: "empty text".to_string(),
            });
        }
        _ => {}
    }

    defects
}

/// One conflict per id declared more than once, in order of first appearance
pub(crate) fn duplicate_id_defects<'a>(
    ids: impl Iterator<Item = (usize, &'a str)>,
) -> Vec<RuleDefect> {
    let mut first_seen: Vec<&'a str> = Vec::new();
    let mut positions: BTreeMap<&'a str, Vec<usize>> = BTreeMap::new();

    for (index, id) in ids {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        let slots = positions.entry(id).or_default();
        if slots.is_empty() {
            first_seen.push(id);
        }
        slots.push(index);
    }

    first_seen
        .into_iter()
        .filter_map(|id| {
            let slots = positions.remove(id)?;
            (slots.len() > 1).then(|| {
                RuleDefect::Conflict(RuleConflictError {
                    id: id.to_string(),
                    positions: slots,
                })
            })
        })
        .collect()
}
