//! Categorization rules.
//!
//! A `TransactionRule` is an ordered list of conditions combined left to
//! right, plus the actions to apply when they hold. Evaluation is pure and
//! lives in [`evaluator`]; persistence and the action applier live in the
//! engine ops.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Money, ResultEngine, Transaction, TransactionKind, util::parse_uuid,
};

mod evaluator;

pub use evaluator::{evaluate_rule, evaluate_rules};

use evaluator::check_conditions;

/// What part of the transaction a condition inspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Description,
    Amount,
    Account,
    Direction,
    Type,
    Category,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Amount => "amount",
            Self::Account => "account",
            Self::Direction => "direction",
            Self::Type => "type",
            Self::Category => "category",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::GreaterEqual => "greater_equal",
            Self::LessThan => "less_than",
            Self::LessEqual => "less_equal",
        }
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison or action value as it arrives from JSON.
///
/// The shape is checked per condition/action type when the rule is decoded,
/// never by the storage layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Other(serde_json::Value),
}

impl RuleValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// JSON type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Other(serde_json::Value::Null) => "null",
            Self::Other(serde_json::Value::Bool(_)) => "bool",
            Self::Other(serde_json::Value::Array(_)) => "array",
            Self::Other(serde_json::Value::Object(_)) => "object",
            Self::Other(_) => "value",
        }
    }
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RuleValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for RuleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Uuid> for RuleValue {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<serde_json::Value> for RuleValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub operator: Operator,
    pub value: RuleValue,
    /// `AND` or `OR`, combining this condition with the next one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_gate: Option<String>,
}

impl RuleCondition {
    #[must_use]
    pub fn new(kind: ConditionType, operator: Operator, value: impl Into<RuleValue>) -> Self {
        Self {
            kind,
            operator,
            value: value.into(),
            logic_gate: None,
        }
    }

    #[must_use]
    pub fn logic_gate(mut self, gate: impl Into<String>) -> Self {
        self.logic_gate = Some(gate.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SetCategory,
    SetDescription,
    SetTags,
    SetNote,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetCategory => "set_category",
            Self::SetDescription => "set_description",
            Self::SetTags => "set_tags",
            Self::SetNote => "set_note",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub value: RuleValue,
}

impl RuleAction {
    #[must_use]
    pub fn new(kind: ActionType, value: impl Into<RuleValue>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Tags carried by a `set_tags` value: a list of strings or a single
    /// comma separated string.
    pub fn tags(&self) -> Option<Vec<String>> {
        match &self.value {
            RuleValue::Text(raw) => Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(ToString::to_string)
                    .collect(),
            ),
            RuleValue::Other(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(|tag| tag.trim().to_string()))
                .collect(),
            _ => None,
        }
    }

    fn check(&self) -> Result<(), String> {
        match self.kind {
            ActionType::SetCategory => self
                .value
                .as_text()
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .map(|_| ())
                .ok_or_else(|| "set_category needs a category id".to_string()),
            ActionType::SetDescription | ActionType::SetNote => {
                self.value.as_text().map(|_| ()).ok_or_else(|| {
                    format!(
                        "{} needs a string, got {}",
                        self.kind.as_str(),
                        self.value.type_name()
                    )
                })
            }
            ActionType::SetTags => self
                .tags()
                .map(|_| ())
                .ok_or_else(|| "set_tags needs a list of strings".to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRule {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub active: bool,
    /// Higher is evaluated first and wins.
    pub priority: i32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRule {
    /// Rejects rules that could never be evaluated or applied.
    pub fn validate(&self) -> ResultEngine<()> {
        if self.conditions.is_empty() {
            return Err(EngineError::InvalidRule(
                "a rule needs at least one condition".to_string(),
            ));
        }
        if self.actions.is_empty() {
            return Err(EngineError::InvalidRule(
                "a rule needs at least one action".to_string(),
            ));
        }
        check_conditions(&self.conditions).map_err(EngineError::InvalidRule)?;
        for (index, action) in self.actions.iter().enumerate() {
            action
                .check()
                .map_err(|err| EngineError::InvalidRule(format!("action {index}: {err}")))?;
        }
        Ok(())
    }
}

/// Read-only projection of a transaction used for rule evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub id: Uuid,
    /// Positive magnitude; direction is carried by `kind` and `is_external`.
    pub amount: Money,
    pub kind: TransactionKind,
    pub account_id: Uuid,
    pub account_name: String,
    pub category_id: Option<Uuid>,
    /// Uncategorized transactions compare as the empty name.
    pub category_name: Option<String>,
    pub destination_account_id: Option<Uuid>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub currency: Currency,
    pub is_external: bool,
    pub tags: Vec<String>,
}

impl TransactionSnapshot {
    /// Snapshot of a bare transaction, without denormalized names.
    #[must_use]
    pub fn new(kind: TransactionKind, amount: Money, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount: amount.abs(),
            kind,
            account_id: Uuid::nil(),
            account_name: String::new(),
            category_id: None,
            category_name: None,
            destination_account_id: None,
            description: None,
            occurred_at,
            currency: Currency::default(),
            is_external: false,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_transaction(
        tx: &Transaction,
        account_name: impl Into<String>,
        category_name: Option<String>,
    ) -> Self {
        Self {
            id: tx.id,
            amount: tx.magnitude(),
            kind: tx.kind,
            account_id: tx.account_id,
            account_name: account_name.into(),
            category_id: tx.category_id,
            category_name,
            destination_account_id: tx.destination_account_id,
            description: tx.description.clone(),
            occurred_at: tx.occurred_at,
            currency: tx.currency,
            // Transfers only ever move money between the user's own accounts.
            is_external: false,
            tags: tx.details.tags.clone(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn account(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.account_id = id;
        self.account_name = name.into();
        self
    }

    #[must_use]
    pub fn category(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.category_id = Some(id);
        self.category_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn external(mut self, is_external: bool) -> Self {
        self.is_external = is_external;
        self
    }
}

/// Outcome of evaluating one rule against one snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub rule_priority: i32,
    pub actions: Vec<RuleAction>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which of the matching rules get their actions enacted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Only the highest-priority match is applied; the rest are reported.
    FirstMatchWins,
    /// Every match is applied in priority order; later actions overwrite.
    AllMatches,
}

/// Policy used by [`crate::Engine::apply_rules_to_transaction`].
pub const RULE_MATCH_POLICY: MatchPolicy = MatchPolicy::FirstMatchWins;

impl MatchPolicy {
    /// Matches whose actions should be applied, in application order.
    #[must_use]
    pub fn select(self, matches: &[RuleMatch]) -> &[RuleMatch] {
        match self {
            Self::FirstMatchWins => &matches[..matches.len().min(1)],
            Self::AllMatches => matches,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub active: bool,
    pub priority: i32,
    /// JSON encoded `Vec<RuleCondition>`.
    pub conditions: String,
    /// JSON encoded `Vec<RuleAction>`.
    pub actions: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&TransactionRule> for ActiveModel {
    type Error = EngineError;

    fn try_from(rule: &TransactionRule) -> ResultEngine<Self> {
        Ok(Self {
            id: ActiveValue::Set(rule.id.to_string()),
            owner_id: ActiveValue::Set(rule.owner_id.clone()),
            name: ActiveValue::Set(rule.name.clone()),
            active: ActiveValue::Set(rule.active),
            priority: ActiveValue::Set(rule.priority),
            conditions: ActiveValue::Set(serde_json::to_string(&rule.conditions)?),
            actions: ActiveValue::Set(serde_json::to_string(&rule.actions)?),
            created_at: ActiveValue::Set(rule.created_at),
            updated_at: ActiveValue::Set(rule.updated_at),
            deleted_at: ActiveValue::Set(None),
        })
    }
}

impl TryFrom<Model> for TransactionRule {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "rule")?,
            owner_id: model.owner_id,
            name: model.name,
            active: model.active,
            priority: model.priority,
            conditions: serde_json::from_str(&model.conditions)?,
            actions: serde_json::from_str(&model.actions)?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_decode_polymorphic_values() {
        let raw = r#"[
            {"type":"description","operator":"contains","value":"grocery","logic_gate":"and"},
            {"type":"amount","operator":"greater_than","value":30},
            {"type":"amount","operator":"less_equal","value":99.95},
            {"type":"category","operator":"equals","value":null}
        ]"#;
        let conditions: Vec<RuleCondition> = serde_json::from_str(raw).unwrap();

        assert_eq!(conditions[0].value, RuleValue::Text("grocery".to_string()));
        assert_eq!(conditions[0].logic_gate.as_deref(), Some("and"));
        assert_eq!(conditions[1].value, RuleValue::Integer(30));
        assert_eq!(conditions[2].value, RuleValue::Number(99.95));
        assert_eq!(conditions[3].value.type_name(), "null");
        assert_eq!(conditions[1].logic_gate, None);
    }

    #[test]
    fn unknown_operator_is_rejected_at_decode() {
        let raw = r#"{"type":"amount","operator":"between","value":1}"#;
        assert!(serde_json::from_str::<RuleCondition>(raw).is_err());
    }

    #[test]
    fn first_match_wins_selects_one() {
        let m = |priority| RuleMatch {
            rule_id: Uuid::new_v4(),
            rule_name: format!("rule {priority}"),
            rule_priority: priority,
            actions: Vec::new(),
            applied: true,
            error: None,
        };
        let matches = vec![m(10), m(5)];

        let selected = MatchPolicy::FirstMatchWins.select(&matches);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].rule_priority, 10);
        assert_eq!(MatchPolicy::AllMatches.select(&matches).len(), 2);
        assert!(MatchPolicy::FirstMatchWins.select(&[]).is_empty());
    }
}
