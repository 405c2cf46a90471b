//! The module contains `Account` struct and its entity.

use chrono::{DateTime, Utc};

use sea_orm::entity::{ActiveValue, prelude::*};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Money,
    util::{model_currency, parse_uuid},
};

/// An account.
///
/// An account is where money is kept: a bank account, a wallet, a savings
/// pot. Its `balance` is the running sum of every committed transaction leg
/// against it and is only ever maintained on write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub currency: Currency,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(owner_id: String, name: String, currency: Currency, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            currency,
            balance: Money::ZERO,
            created_at,
            deleted_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub currency: String,
    /// Canonical decimal text, see [`Money::to_storage`].
    pub balance: String,
    pub created_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(value: &Account) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            owner_id: ActiveValue::Set(value.owner_id.clone()),
            name: ActiveValue::Set(value.name.clone()),
            currency: ActiveValue::Set(value.currency.code().to_string()),
            balance: ActiveValue::Set(value.balance.to_storage()),
            created_at: ActiveValue::Set(value.created_at),
            deleted_at: ActiveValue::Set(value.deleted_at),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            currency: model_currency(&model.currency)?,
            balance: Money::from_storage(&model.balance, "balance")?,
            owner_id: model.owner_id,
            name: model.name,
            created_at: model.created_at,
            deleted_at: model.deleted_at,
        })
    }
}
