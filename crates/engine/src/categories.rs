//! Category registry per user.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

/// A user-owned label attached to transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(owner_id: String, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(value: &Category) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            owner_id: ActiveValue::Set(value.owner_id.clone()),
            name: ActiveValue::Set(value.name.clone()),
            created_at: ActiveValue::Set(value.created_at),
            deleted_at: ActiveValue::Set(None),
        }
    }
}

impl TryFrom<Model> for Category {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "category")?,
            owner_id: model.owner_id,
            name: model.name,
            created_at: model.created_at,
        })
    }
}
