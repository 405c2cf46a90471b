//! Recurring transaction templates.
//!
//! A template describes an amount posted on a schedule. Date arithmetic and
//! projection are pure and live in [`schedule`]; the engine ops store
//! templates and materialize due occurrences.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, Money, ResultEngine, TransactionKind,
    util::{parse_optional_uuid, parse_uuid},
};

mod schedule;

pub use schedule::{
    DateWindow, ProjectedOccurrence, Projection, compute_next_due_date, project_instances,
};

/// Largest accepted `interval`.
pub const MAX_INTERVAL: u32 = 999;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
    Custom,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }
}

impl TryFrom<&str> for Frequency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "custom" => Ok(Self::Custom),
            other => Err(EngineError::Validation(format!(
                "invalid frequency: {other}"
            ))),
        }
    }
}

/// Pattern data for `Frequency::Custom`.
///
/// - `day_of_week` + `week_of_month`: the Nth weekday of the month
///   (`day_of_week` 0 = Sunday .. 6 = Saturday, `week_of_month` 1..=5, or -1
///   for the last one);
/// - `specific_dates`: days of the month, e.g. `[1, 15]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specific_dates: Vec<u32>,
}

impl FrequencyData {
    #[must_use]
    pub fn nth_weekday(day_of_week: u32, week_of_month: i32) -> Self {
        Self {
            day_of_week: Some(day_of_week),
            week_of_month: Some(week_of_month),
            specific_dates: Vec::new(),
        }
    }

    #[must_use]
    pub fn specific_dates(dates: impl Into<Vec<u32>>) -> Self {
        Self {
            day_of_week: None,
            week_of_month: None,
            specific_dates: dates.into(),
        }
    }

    pub fn validate(&self) -> ResultEngine<()> {
        if let Some(day) = self.day_of_week
            && day > 6
        {
            return Err(EngineError::Validation(
                "day_of_week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if let Some(week) = self.week_of_month
            && !(week == -1 || (1..=5).contains(&week))
        {
            return Err(EngineError::Validation(
                "week_of_month must be between 1 and 5, or -1 for the last week".to_string(),
            ));
        }
        if self.day_of_week.is_some() != self.week_of_month.is_some() {
            return Err(EngineError::Validation(
                "day_of_week and week_of_month must be set together".to_string(),
            ));
        }
        if self.specific_dates.iter().any(|d| !(1..=31).contains(d)) {
            return Err(EngineError::Validation(
                "specific_dates must be between 1 and 31".to_string(),
            ));
        }
        if self.day_of_week.is_none() && self.specific_dates.is_empty() {
            return Err(EngineError::Validation(
                "custom frequency needs a weekday pattern or specific dates".to_string(),
            ));
        }
        Ok(())
    }
}

/// Derived lifecycle state of a template. Never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateState {
    Active,
    Paused,
    /// `max_occurrences` reached or `next_due_date` past `end_date`.
    Exhausted,
}

impl TemplateState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringTransaction {
    pub id: Uuid,
    pub owner_id: String,
    pub account_id: Uuid,
    pub destination_account_id: Option<Uuid>,
    pub kind: TransactionKind,
    /// Positive magnitude of every occurrence.
    pub amount: Money,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub interval: u32,
    pub frequency_data: Option<FrequencyData>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Next unconsumed occurrence. Only ever moves forward.
    pub next_due_date: DateTime<Utc>,
    pub last_generated_date: Option<DateTime<Utc>>,
    pub auto_post: bool,
    pub paused: bool,
    pub occurrences_count: u32,
    pub max_occurrences: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringTransaction {
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max_occurrences
            .is_some_and(|max| self.occurrences_count >= max)
            || self.end_date.is_some_and(|end| self.next_due_date > end)
    }

    /// Exhaustion wins over pause: an exhausted template cannot resume.
    #[must_use]
    pub fn state(&self) -> TemplateState {
        if self.is_exhausted() {
            TemplateState::Exhausted
        } else if self.paused {
            TemplateState::Paused
        } else {
            TemplateState::Active
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state() == TemplateState::Active && self.next_due_date <= now
    }

    /// Checks the template invariants before it is stored.
    pub fn validate(&self) -> ResultEngine<()> {
        if !self.amount.is_positive() {
            return Err(EngineError::Validation("amount must be positive".to_string()));
        }
        if self.amount > Money::max_amount() {
            return Err(EngineError::Validation(format!(
                "amount must be at most {}",
                Money::max_amount()
            )));
        }
        if self.interval < 1 {
            return Err(EngineError::Validation(
                "frequency interval must be at least 1".to_string(),
            ));
        }
        if self.interval > MAX_INTERVAL {
            return Err(EngineError::Validation(format!(
                "frequency interval must be at most {MAX_INTERVAL}"
            )));
        }
        if let Some(end) = self.end_date
            && end < self.start_date
        {
            return Err(EngineError::Validation(
                "end date must be after start date".to_string(),
            ));
        }
        if self.max_occurrences.is_some_and(|max| max < 1) {
            return Err(EngineError::Validation(
                "max occurrences must be at least 1".to_string(),
            ));
        }
        match (self.kind, self.destination_account_id) {
            (TransactionKind::Transfer, None) => {
                return Err(EngineError::Validation(
                    "transfer templates need a destination account".to_string(),
                ));
            }
            (TransactionKind::Transfer, Some(destination)) if destination == self.account_id => {
                return Err(EngineError::SameAccount);
            }
            (TransactionKind::Income | TransactionKind::Expense, Some(_)) => {
                return Err(EngineError::Validation(
                    "only transfer templates take a destination account".to_string(),
                ));
            }
            _ => {}
        }
        if self.frequency == Frequency::Custom {
            self.frequency_data
                .as_ref()
                .ok_or_else(|| {
                    EngineError::Validation("custom frequency needs frequency_data".to_string())
                })?
                .validate()?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recurring_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub account_id: String,
    pub destination_account_id: Option<String>,
    pub kind: String,
    pub amount: String,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub frequency: String,
    pub frequency_interval: i64,
    /// JSON encoded [`FrequencyData`].
    pub frequency_data: Option<String>,
    pub start_date: DateTimeUtc,
    pub end_date: Option<DateTimeUtc>,
    pub next_due_date: DateTimeUtc,
    pub last_generated_date: Option<DateTimeUtc>,
    pub auto_post: bool,
    pub paused: bool,
    pub occurrences_count: i64,
    pub max_occurrences: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&RecurringTransaction> for ActiveModel {
    type Error = EngineError;

    fn try_from(value: &RecurringTransaction) -> ResultEngine<Self> {
        Ok(Self {
            id: ActiveValue::Set(value.id.to_string()),
            owner_id: ActiveValue::Set(value.owner_id.clone()),
            account_id: ActiveValue::Set(value.account_id.to_string()),
            destination_account_id: ActiveValue::Set(
                value.destination_account_id.map(|id| id.to_string()),
            ),
            kind: ActiveValue::Set(value.kind.as_str().to_string()),
            amount: ActiveValue::Set(value.amount.to_storage()),
            category_id: ActiveValue::Set(value.category_id.map(|id| id.to_string())),
            description: ActiveValue::Set(value.description.clone()),
            frequency: ActiveValue::Set(value.frequency.as_str().to_string()),
            frequency_interval: ActiveValue::Set(i64::from(value.interval)),
            frequency_data: ActiveValue::Set(
                value
                    .frequency_data
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ),
            start_date: ActiveValue::Set(value.start_date),
            end_date: ActiveValue::Set(value.end_date),
            next_due_date: ActiveValue::Set(value.next_due_date),
            last_generated_date: ActiveValue::Set(value.last_generated_date),
            auto_post: ActiveValue::Set(value.auto_post),
            paused: ActiveValue::Set(value.paused),
            occurrences_count: ActiveValue::Set(i64::from(value.occurrences_count)),
            max_occurrences: ActiveValue::Set(value.max_occurrences.map(i64::from)),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
            deleted_at: ActiveValue::Set(None),
        })
    }
}

fn stored_count(value: i64, label: &str) -> ResultEngine<u32> {
    u32::try_from(value).map_err(|_| EngineError::Validation(format!("invalid stored {label}")))
}

impl TryFrom<Model> for RecurringTransaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "recurring")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            destination_account_id: parse_optional_uuid(
                model.destination_account_id.as_deref(),
                "destination account",
            )?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            amount: Money::from_storage(&model.amount, "amount")?,
            category_id: parse_optional_uuid(model.category_id.as_deref(), "category")?,
            frequency: Frequency::try_from(model.frequency.as_str())?,
            interval: stored_count(model.frequency_interval, "interval")?,
            frequency_data: model
                .frequency_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            occurrences_count: stored_count(model.occurrences_count, "occurrences")?,
            max_occurrences: model
                .max_occurrences
                .map(|max| stored_count(max, "max occurrences"))
                .transpose()?,
            owner_id: model.owner_id,
            description: model.description,
            start_date: model.start_date,
            end_date: model.end_date,
            next_due_date: model.next_due_date,
            last_generated_date: model.last_generated_date,
            auto_post: model.auto_post,
            paused: model.paused,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;

    pub(crate) fn template(frequency: Frequency, start: DateTime<Utc>) -> RecurringTransaction {
        RecurringTransaction {
            id: Uuid::new_v4(),
            owner_id: "alice".to_string(),
            account_id: Uuid::new_v4(),
            destination_account_id: None,
            kind: TransactionKind::Expense,
            amount: Money::from(100),
            category_id: None,
            description: Some("Rent".to_string()),
            frequency,
            interval: 1,
            frequency_data: None,
            start_date: start,
            end_date: None,
            next_due_date: start,
            last_generated_date: None,
            auto_post: true,
            paused: false,
            occurrences_count: 0,
            max_occurrences: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 8, 0, 0).unwrap()
    }

    #[test]
    fn validation_rejects_bad_templates() {
        let ok = template(Frequency::Monthly, jan(15));
        assert!(ok.validate().is_ok());

        let mut t = ok.clone();
        t.amount = Money::ZERO;
        assert_eq!(
            t.validate(),
            Err(EngineError::Validation("amount must be positive".to_string()))
        );

        let mut t = ok.clone();
        t.amount = "40000000000000000000000000000".parse().unwrap();
        assert!(matches!(
            t.validate(),
            Err(EngineError::Validation(msg)) if msg.starts_with("amount must be at most")
        ));

        let mut t = ok.clone();
        t.interval = 0;
        assert!(t.validate().is_err());
        t.interval = 1000;
        assert!(t.validate().is_err());

        let mut t = ok.clone();
        t.end_date = Some(jan(1));
        assert_eq!(
            t.validate(),
            Err(EngineError::Validation("end date must be after start date".to_string()))
        );

        let mut t = ok.clone();
        t.max_occurrences = Some(0);
        assert!(t.validate().is_err());

        let mut t = ok.clone();
        t.kind = TransactionKind::Transfer;
        assert!(t.validate().is_err());
        t.destination_account_id = Some(t.account_id);
        assert_eq!(t.validate(), Err(EngineError::SameAccount));

        let mut t = ok;
        t.frequency = Frequency::Custom;
        assert!(t.validate().is_err());
        t.frequency_data = Some(FrequencyData::nth_weekday(7, 1));
        assert!(t.validate().is_err());
        t.frequency_data = Some(FrequencyData::nth_weekday(1, 0));
        assert!(t.validate().is_err());
        t.frequency_data = Some(FrequencyData::nth_weekday(1, -1));
        assert!(t.validate().is_ok());
        t.frequency_data = Some(FrequencyData::specific_dates([0, 15]));
        assert!(t.validate().is_err());
    }

    #[test]
    fn state_is_derived() {
        let mut t = template(Frequency::Daily, jan(1));
        assert_eq!(t.state(), TemplateState::Active);
        assert!(t.is_due(jan(1)));

        t.paused = true;
        assert_eq!(t.state(), TemplateState::Paused);
        assert!(!t.is_due(jan(2)));

        t.max_occurrences = Some(2);
        t.occurrences_count = 2;
        assert_eq!(t.state(), TemplateState::Exhausted);

        let mut t = template(Frequency::Daily, jan(1));
        t.end_date = Some(jan(3));
        t.next_due_date = jan(4);
        assert!(t.is_exhausted());
    }

    #[test]
    fn frequency_data_json_shape() {
        let data: FrequencyData =
            serde_json::from_str(r#"{"day_of_week":1,"week_of_month":-1}"#).unwrap();
        assert_eq!(data, FrequencyData::nth_weekday(1, -1));
        assert_eq!(
            serde_json::to_string(&FrequencyData::specific_dates([1, 15])).unwrap(),
            r#"{"specific_dates":[1,15]}"#
        );
    }
}
