//! Transaction primitives.
//!
//! A `Transaction` is one ledger row. Income and expense rows touch a single
//! account; a transfer row carries the negative (outgoing) amount of the
//! source leg and implies the opposite effect on the destination account.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Money, ResultEngine,
    util::{model_currency, parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    /// Signs a positive magnitude the way the row stores it.
    #[must_use]
    pub fn signed(self, magnitude: Money) -> Money {
        match self {
            Self::Income => magnitude,
            Self::Expense | Self::Transfer => -magnitude,
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::Validation(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

/// Structured side-field stored next to a transaction row.
///
/// Keys the engine does not know about are kept verbatim in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TransactionDetails {
    pub fn is_empty(&self) -> bool {
        self.note.is_none() && self.tags.is_empty() && self.extra.is_empty()
    }

    fn to_column(&self) -> ResultEngine<Option<String>> {
        if self.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(self)?))
    }

    fn from_column(value: Option<&str>) -> ResultEngine<Self> {
        match value {
            None => Ok(Self::default()),
            Some(raw) => Ok(serde_json::from_str(raw)?),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub account_id: Uuid,
    /// Only set for transfers.
    pub destination_account_id: Option<Uuid>,
    /// Signed: income `+`, expense `-`, transfer `-` (source leg).
    pub amount: Money,
    pub currency: Currency,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub details: TransactionDetails,
    pub occurred_at: DateTime<Utc>,
    /// Template that materialized this row, if any.
    pub recurring_id: Option<Uuid>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Builds a new row from a positive magnitude, signing it by `kind`.
    pub fn new(
        kind: TransactionKind,
        account_id: Uuid,
        destination_account_id: Option<Uuid>,
        magnitude: Money,
        currency: Currency,
        occurred_at: DateTime<Utc>,
        created_by: String,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !magnitude.is_positive() {
            return Err(EngineError::InvalidAmount("amount must be > 0".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            account_id,
            destination_account_id,
            amount: kind.signed(magnitude),
            currency,
            category_id: None,
            description: None,
            details: TransactionDetails::default(),
            occurred_at,
            recurring_id: None,
            created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Positive magnitude of the amount.
    #[must_use]
    pub fn magnitude(&self) -> Money {
        self.amount.abs()
    }

    /// Balance effect of this row per account.
    ///
    /// A transfer yields two legs that sum to zero.
    #[must_use]
    pub fn balance_effects(&self) -> Vec<(Uuid, Money)> {
        match (self.kind, self.destination_account_id) {
            (TransactionKind::Transfer, Some(destination)) => {
                vec![(self.account_id, self.amount), (destination, -self.amount)]
            }
            _ => vec![(self.account_id, self.amount)],
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub account_id: String,
    pub destination_account_id: Option<String>,
    /// Canonical decimal text, see [`Money::to_storage`].
    pub amount: String,
    pub currency: String,
    pub category_id: Option<String>,
    pub description: Option<String>,
    /// JSON encoded [`TransactionDetails`].
    pub details: Option<String>,
    pub occurred_at: DateTimeUtc,
    pub recurring_id: Option<String>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Transaction> for ActiveModel {
    type Error = EngineError;

    fn try_from(tx: &Transaction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(tx.id.to_string()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            account_id: ActiveValue::Set(tx.account_id.to_string()),
            destination_account_id: ActiveValue::Set(
                tx.destination_account_id.map(|id| id.to_string()),
            ),
            amount: ActiveValue::Set(tx.amount.to_storage()),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            category_id: ActiveValue::Set(tx.category_id.map(|id| id.to_string())),
            description: ActiveValue::Set(tx.description.clone()),
            details: ActiveValue::Set(tx.details.to_column()?),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            recurring_id: ActiveValue::Set(tx.recurring_id.map(|id| id.to_string())),
            created_by: ActiveValue::Set(tx.created_by.clone()),
            updated_by: ActiveValue::Set(tx.updated_by.clone()),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
            deleted_at: ActiveValue::Set(tx.deleted_at),
        })
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            account_id: parse_uuid(&model.account_id, "account")?,
            destination_account_id: parse_optional_uuid(
                model.destination_account_id.as_deref(),
                "destination account",
            )?,
            amount: Money::from_storage(&model.amount, "amount")?,
            currency: model_currency(&model.currency)?,
            category_id: parse_optional_uuid(model.category_id.as_deref(), "category")?,
            description: model.description,
            details: TransactionDetails::from_column(model.details.as_deref())?,
            occurred_at: model.occurred_at,
            recurring_id: parse_optional_uuid(model.recurring_id.as_deref(), "recurring")?,
            created_by: model.created_by,
            updated_by: model.updated_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    #[test]
    fn kinds_sign_magnitudes() {
        let amount: Money = "12.50".parse().unwrap();
        assert_eq!(TransactionKind::Income.signed(amount), amount);
        assert_eq!(TransactionKind::Expense.signed(amount), -amount);
        assert_eq!(TransactionKind::Transfer.signed(amount), -amount);
    }

    #[test]
    fn transfer_effects_conserve_money() {
        let source = Uuid::new_v4();
        let destination = Uuid::new_v4();
        let tx = Transaction::new(
            TransactionKind::Transfer,
            source,
            Some(destination),
            "40".parse().unwrap(),
            Currency::Eur,
            at(),
            "alice".to_string(),
            at(),
        )
        .unwrap();

        let effects = tx.balance_effects();
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0], (source, Money::from(-40)));
        assert_eq!(effects[1], (destination, Money::from(40)));
        assert_eq!(effects.iter().map(|(_, m)| *m).sum::<Money>(), Money::ZERO);
    }

    #[test]
    fn rejects_non_positive_magnitudes() {
        let err = Transaction::new(
            TransactionKind::Expense,
            Uuid::new_v4(),
            None,
            Money::ZERO,
            Currency::Eur,
            at(),
            "alice".to_string(),
            at(),
        )
        .unwrap_err();
        assert_eq!(err, EngineError::InvalidAmount("amount must be > 0".to_string()));
    }

    #[test]
    fn details_keep_unknown_keys() {
        let raw = r#"{"note":"rent","tags":["home"],"merchant":"ACME"}"#;
        let details = TransactionDetails::from_column(Some(raw)).unwrap();
        assert_eq!(details.note.as_deref(), Some("rent"));
        assert_eq!(details.tags, vec!["home".to_string()]);
        assert_eq!(details.extra["merchant"], serde_json::json!("ACME"));

        let encoded = details.to_column().unwrap().unwrap();
        assert!(encoded.contains("\"merchant\":\"ACME\""));
        assert_eq!(TransactionDetails::default().to_column().unwrap(), None);
    }
}
