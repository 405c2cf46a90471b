//! Pure rule evaluation.
//!
//! Each condition is first decoded into a typed [`Predicate`]; operators a
//! condition type does not support and values of the wrong shape fail the
//! decode, which aborts the rule (never the batch).

use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ConditionType, Operator, RuleCondition, RuleMatch, RuleValue, TransactionRule};
use crate::{TransactionKind, TransactionSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TextOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl TextOp {
    fn from_operator(operator: Operator) -> Option<Self> {
        match operator {
            Operator::Equals => Some(Self::Equals),
            Operator::NotEquals => Some(Self::NotEquals),
            Operator::Contains => Some(Self::Contains),
            Operator::NotContains => Some(Self::NotContains),
            Operator::StartsWith => Some(Self::StartsWith),
            Operator::EndsWith => Some(Self::EndsWith),
            _ => None,
        }
    }

    /// Both sides are already lowercase.
    fn eval(self, value: &str, needle: &str) -> bool {
        match self {
            Self::Equals => value == needle,
            Self::NotEquals => value != needle,
            Self::Contains => value.contains(needle),
            Self::NotContains => !value.contains(needle),
            Self::StartsWith => value.starts_with(needle),
            Self::EndsWith => value.ends_with(needle),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompareOp {
    Equals,
    NotEquals,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl CompareOp {
    fn from_operator(operator: Operator) -> Option<Self> {
        match operator {
            Operator::Equals => Some(Self::Equals),
            Operator::NotEquals => Some(Self::NotEquals),
            Operator::GreaterThan => Some(Self::Greater),
            Operator::GreaterEqual => Some(Self::GreaterEqual),
            Operator::LessThan => Some(Self::Less),
            Operator::LessEqual => Some(Self::LessEqual),
            _ => None,
        }
    }

    fn eval(self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Equals => value == threshold,
            Self::NotEquals => value != threshold,
            Self::Greater => value > threshold,
            Self::GreaterEqual => value >= threshold,
            Self::Less => value < threshold,
            Self::LessEqual => value <= threshold,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IdentityOp {
    Equals,
    NotEquals,
}

impl IdentityOp {
    fn from_operator(operator: Operator) -> Option<Self> {
        match operator {
            Operator::Equals => Some(Self::Equals),
            Operator::NotEquals => Some(Self::NotEquals),
            _ => None,
        }
    }

    fn eval<T: PartialEq>(self, value: T, expected: T) -> bool {
        match self {
            Self::Equals => value == expected,
            Self::NotEquals => value != expected,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    Description { op: TextOp, needle: String },
    Amount { op: CompareOp, threshold: Decimal },
    AccountId { op: IdentityOp, id: Uuid },
    AccountName { op: TextOp, needle: String },
    Direction { op: IdentityOp, value: String },
    Kind { op: IdentityOp, value: String },
    CategoryId { op: IdentityOp, id: Uuid },
    CategoryName { op: TextOp, needle: String },
}

fn text_value<'a>(value: &'a RuleValue) -> Result<&'a str, String> {
    value
        .as_text()
        .ok_or_else(|| "condition value must be a string".to_string())
}

fn text_predicate(
    condition: &RuleCondition,
    label: &str,
) -> Result<(TextOp, String), String> {
    let op = TextOp::from_operator(condition.operator).ok_or_else(|| {
        format!(
            "unsupported operator for {label} condition: {}",
            condition.operator
        )
    })?;
    let needle = text_value(&condition.value)?.to_lowercase();
    Ok((op, needle))
}

fn identity_op(operator: Operator, label: &str) -> Result<IdentityOp, String> {
    IdentityOp::from_operator(operator)
        .ok_or_else(|| format!("unsupported operator for {label} condition: {operator}"))
}

/// Decimal threshold from a string, integer or float value.
///
/// Floats go through their shortest decimal representation, never through
/// binary arithmetic.
fn amount_value(value: &RuleValue) -> Result<Decimal, String> {
    match value {
        RuleValue::Text(raw) => {
            Decimal::from_str(raw.trim()).map_err(|err| format!("invalid amount value: {err}"))
        }
        RuleValue::Integer(raw) => Ok(Decimal::from(*raw)),
        RuleValue::Number(raw) => Decimal::from_str(&raw.to_string())
            .map_err(|err| format!("invalid amount value: {err}")),
        other => Err(format!(
            "unsupported amount value type: {}",
            other.type_name()
        )),
    }
}

impl Predicate {
    fn decode(condition: &RuleCondition) -> Result<Self, String> {
        match condition.kind {
            ConditionType::Description => {
                let (op, needle) = text_predicate(condition, "string")?;
                Ok(Self::Description { op, needle })
            }
            ConditionType::Amount => {
                let op = CompareOp::from_operator(condition.operator).ok_or_else(|| {
                    format!(
                        "unsupported operator for amount condition: {}",
                        condition.operator
                    )
                })?;
                let threshold = amount_value(&condition.value)?;
                Ok(Self::Amount { op, threshold })
            }
            ConditionType::Account | ConditionType::Category => {
                let is_account = condition.kind == ConditionType::Account;
                let label = condition.kind.as_str();
                let Some(raw) = condition.value.as_text() else {
                    return Err(format!(
                        "unsupported {label} value type: {}",
                        condition.value.type_name()
                    ));
                };
                if let Ok(id) = Uuid::parse_str(raw) {
                    let op = identity_op(condition.operator, &format!("{label} ID"))?;
                    return Ok(if is_account {
                        Self::AccountId { op, id }
                    } else {
                        Self::CategoryId { op, id }
                    });
                }
                let (op, needle) = text_predicate(condition, "string")?;
                Ok(if is_account {
                    Self::AccountName { op, needle }
                } else {
                    Self::CategoryName { op, needle }
                })
            }
            ConditionType::Direction => {
                let value = text_value(&condition.value)?.to_string();
                let op = identity_op(condition.operator, "direction")?;
                Ok(Self::Direction { op, value })
            }
            ConditionType::Type => {
                let value = text_value(&condition.value)?.to_string();
                let op = identity_op(condition.operator, "type")?;
                Ok(Self::Kind { op, value })
            }
        }
    }

    fn eval(&self, snapshot: &TransactionSnapshot) -> bool {
        match self {
            Self::Description { op, needle } => snapshot
                .description
                .as_deref()
                .is_some_and(|description| op.eval(&description.to_lowercase(), needle)),
            Self::Amount { op, threshold } => op.eval(snapshot.amount.decimal(), *threshold),
            Self::AccountId { op, id } => op.eval(snapshot.account_id, *id),
            Self::AccountName { op, needle } => {
                op.eval(&snapshot.account_name.to_lowercase(), needle)
            }
            Self::Direction { op, value } => {
                op.eval(direction(snapshot.kind, snapshot.is_external), value.as_str())
            }
            Self::Kind { op, value } => op.eval(snapshot.kind.as_str(), value.as_str()),
            Self::CategoryId { op, id } => op.eval(snapshot.category_id, Some(*id)),
            Self::CategoryName { op, needle } => op.eval(
                &snapshot
                    .category_name
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase(),
                needle,
            ),
        }
    }
}

/// Synthetic direction derived from kind and the external flag.
fn direction(kind: TransactionKind, is_external: bool) -> &'static str {
    match kind {
        TransactionKind::Income => "incoming",
        TransactionKind::Expense => "outgoing",
        TransactionKind::Transfer if is_external => "outgoing",
        TransactionKind::Transfer => "internal",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Gate {
    And,
    Or,
}

impl Gate {
    /// Empty or unrecognized gates mean AND.
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|gate| gate.trim().to_ascii_uppercase()).as_deref() {
            Some("OR") => Self::Or,
            _ => Self::And,
        }
    }
}

/// Combines results left to right; the gate on condition `i - 1` joins
/// result `i`.
fn combine(results: &[bool], conditions: &[RuleCondition]) -> bool {
    let Some((&first, rest)) = results.split_first() else {
        return false;
    };
    rest.iter()
        .zip(conditions)
        .fold(first, |acc, (&next, previous)| {
            match Gate::parse(previous.logic_gate.as_deref()) {
                Gate::And => acc && next,
                Gate::Or => acc || next,
            }
        })
}

fn rule_match(rule: &TransactionRule, applied: bool, error: Option<String>) -> RuleMatch {
    RuleMatch {
        rule_id: rule.id,
        rule_name: rule.name.clone(),
        rule_priority: rule.priority,
        actions: rule.actions.clone(),
        applied,
        error,
    }
}

/// Reports the first condition that cannot be decoded.
pub(super) fn check_conditions(conditions: &[RuleCondition]) -> Result<(), String> {
    for (index, condition) in conditions.iter().enumerate() {
        Predicate::decode(condition).map_err(|err| format!("condition {index}: {err}"))?;
    }
    Ok(())
}

/// Evaluates one rule against one snapshot.
///
/// Inactive rules and rules whose conditions fail to decode are reported with
/// `applied = false` and the reason in `error`. A rule with no conditions
/// never matches.
#[must_use]
pub fn evaluate_rule(rule: &TransactionRule, snapshot: &TransactionSnapshot) -> RuleMatch {
    if !rule.active {
        return rule_match(rule, false, Some("Rule is not active".to_string()));
    }

    let mut results = Vec::with_capacity(rule.conditions.len());
    for (index, condition) in rule.conditions.iter().enumerate() {
        // A missing description is a plain non-match, whatever the condition says.
        if condition.kind == ConditionType::Description && snapshot.description.is_none() {
            results.push(false);
            continue;
        }
        match Predicate::decode(condition) {
            Ok(predicate) => results.push(predicate.eval(snapshot)),
            Err(err) => {
                return rule_match(
                    rule,
                    false,
                    Some(format!("Error evaluating condition {index}: {err}")),
                );
            }
        }
    }

    rule_match(rule, combine(&results, &rule.conditions), None)
}

/// Evaluates every rule and keeps the matches, in input order.
///
/// `rules` is expected to be sorted by descending priority already.
#[must_use]
pub fn evaluate_rules(rules: &[TransactionRule], snapshot: &TransactionSnapshot) -> Vec<RuleMatch> {
    rules
        .iter()
        .map(|rule| evaluate_rule(rule, snapshot))
        .filter(|m| m.applied)
        .collect()
}
