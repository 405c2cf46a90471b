//! Command structs for engine operations.
//!
//! These types group parameters for write operations (postings, transfers,
//! updates, rules and recurring templates), keeping call sites readable and
//! avoiding long argument lists.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Frequency, FrequencyData, Money, RuleAction, RuleCondition, TransactionKind};

/// Post an income or expense against one account.
#[derive(Clone, Debug)]
pub struct PostTransactionCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    /// Positive magnitude; the engine derives the sign from `kind`.
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub tags: Vec<String>,
}

impl PostTransactionCmd {
    #[must_use]
    pub fn income(
        user_id: impl Into<String>,
        account_id: Uuid,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, account_id, TransactionKind::Income, amount, occurred_at)
    }

    #[must_use]
    pub fn expense(
        user_id: impl Into<String>,
        account_id: Uuid,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, account_id, TransactionKind::Expense, amount, occurred_at)
    }

    fn new(
        user_id: impl Into<String>,
        account_id: Uuid,
        kind: TransactionKind,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            kind,
            amount,
            occurred_at,
            category_id: None,
            description: None,
            note: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Move money between two accounts of the same user.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub user_id: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    /// Positive magnitude moved from source to destination.
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub note: Option<String>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            from_account_id,
            to_account_id,
            amount,
            occurred_at,
            category_id: None,
            description: None,
            note: None,
        }
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Update an existing transaction.
///
/// Every field is a patch: `None` keeps the stored value. For text fields an
/// empty string clears the value.
#[derive(Clone, Debug)]
pub struct UpdateTransactionCmd {
    pub transaction_id: Uuid,
    pub user_id: String,

    pub amount: Option<Money>,
    /// Income <-> expense only; transfers keep their kind.
    pub kind: Option<TransactionKind>,
    pub account_id: Option<Uuid>,
    pub destination_account_id: Option<Uuid>,

    pub category_id: Option<Uuid>,
    pub clear_category: bool,
    pub description: Option<String>,
    pub note: Option<String>,
    pub tags: Option<Vec<String>>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new(transaction_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            transaction_id,
            user_id: user_id.into(),
            amount: None,
            kind: None,
            account_id: None,
            destination_account_id: None,
            category_id: None,
            clear_category: false,
            description: None,
            note: None,
            tags: None,
            occurred_at: None,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn account_id(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn destination_account_id(mut self, account_id: Uuid) -> Self {
        self.destination_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn clear_category(mut self) -> Self {
        self.clear_category = true;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// True when the command touches something other than ids.
    pub(crate) fn has_changes(&self) -> bool {
        self.amount.is_some()
            || self.kind.is_some()
            || self.account_id.is_some()
            || self.destination_account_id.is_some()
            || self.category_id.is_some()
            || self.clear_category
            || self.description.is_some()
            || self.note.is_some()
            || self.tags.is_some()
            || self.occurred_at.is_some()
    }
}

/// Create a categorization rule.
#[derive(Clone, Debug)]
pub struct CreateRuleCmd {
    pub user_id: String,
    pub name: String,
    pub active: bool,
    pub priority: i32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
}

impl CreateRuleCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            active: true,
            priority: 0,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Partially update a rule. `None` keeps the stored value.
#[derive(Clone, Debug)]
pub struct UpdateRuleCmd {
    pub rule_id: Uuid,
    pub user_id: String,
    pub name: Option<String>,
    pub active: Option<bool>,
    pub priority: Option<i32>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
}

impl UpdateRuleCmd {
    #[must_use]
    pub fn new(rule_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            rule_id,
            user_id: user_id.into(),
            name: None,
            active: None,
            priority: None,
            conditions: None,
            actions: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn conditions(mut self, conditions: Vec<RuleCondition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    #[must_use]
    pub fn actions(mut self, actions: Vec<RuleAction>) -> Self {
        self.actions = Some(actions);
        self
    }
}

/// Create a recurring transaction template.
#[derive(Clone, Debug)]
pub struct CreateRecurringCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub destination_account_id: Option<Uuid>,
    pub kind: TransactionKind,
    /// Positive magnitude of every occurrence.
    pub amount: Money,
    pub frequency: Frequency,
    pub interval: u32,
    pub frequency_data: Option<FrequencyData>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub auto_post: bool,
    pub max_occurrences: Option<u32>,
}

impl CreateRecurringCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        account_id: Uuid,
        kind: TransactionKind,
        amount: Money,
        frequency: Frequency,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            destination_account_id: None,
            kind,
            amount,
            frequency,
            interval: 1,
            frequency_data: None,
            start_date,
            end_date: None,
            category_id: None,
            description: None,
            auto_post: true,
            max_occurrences: None,
        }
    }

    #[must_use]
    pub fn destination_account_id(mut self, account_id: Uuid) -> Self {
        self.destination_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn frequency_data(mut self, data: FrequencyData) -> Self {
        self.frequency_data = Some(data);
        self
    }

    #[must_use]
    pub fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn auto_post(mut self, auto_post: bool) -> Self {
        self.auto_post = auto_post;
        self
    }

    #[must_use]
    pub fn max_occurrences(mut self, max: u32) -> Self {
        self.max_occurrences = Some(max);
        self
    }
}

/// Partially update a recurring template. `None` keeps the stored value.
#[derive(Clone, Debug)]
pub struct UpdateRecurringCmd {
    pub recurring_id: Uuid,
    pub user_id: String,
    pub amount: Option<Money>,
    pub frequency: Option<Frequency>,
    pub interval: Option<u32>,
    pub frequency_data: Option<FrequencyData>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub auto_post: Option<bool>,
    pub max_occurrences: Option<u32>,
}

impl UpdateRecurringCmd {
    #[must_use]
    pub fn new(recurring_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            recurring_id,
            user_id: user_id.into(),
            amount: None,
            frequency: None,
            interval: None,
            frequency_data: None,
            start_date: None,
            end_date: None,
            category_id: None,
            description: None,
            auto_post: None,
            max_occurrences: None,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn frequency_data(mut self, data: FrequencyData) -> Self {
        self.frequency_data = Some(data);
        self
    }

    #[must_use]
    pub fn start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    #[must_use]
    pub fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn auto_post(mut self, auto_post: bool) -> Self {
        self.auto_post = Some(auto_post);
        self
    }

    #[must_use]
    pub fn max_occurrences(mut self, max: u32) -> Self {
        self.max_occurrences = Some(max);
        self
    }

    /// Fields that change where the schedule starts or how it steps.
    pub(crate) fn reschedules(&self) -> bool {
        self.frequency.is_some()
            || self.interval.is_some()
            || self.frequency_data.is_some()
            || self.start_date.is_some()
    }
}
