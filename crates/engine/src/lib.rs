//! Transaction processing core for a personal-finance ledger.
//!
//! The engine owns three cooperating pieces:
//!
//! - the ledger processor (income, expense and transfer postings against
//!   account balances, with reversal on update and delete);
//! - the rule evaluator and action applier (automatic categorization);
//! - the recurring scheduler (due-date arithmetic, projection and
//!   materialization of templates).
//!
//! All persistence goes through [`Engine`], which wraps every balance-mutating
//! operation in a single database transaction.

pub use accounts::Account;
pub use categories::Category;
pub use commands::{
    CreateRecurringCmd, CreateRuleCmd, PostTransactionCmd, TransferCmd, UpdateRecurringCmd,
    UpdateRuleCmd, UpdateTransactionCmd,
};
pub use currency::Currency;
pub use error::{EngineError, ErrorClass};
pub use money::Money;
pub use ops::{
    BalanceMismatch, DueOutcome, Engine, EngineBuilder, RecurringListFilter, RecurringStats,
    TransactionListFilter, UpcomingInstances,
};
pub use recurring::{
    DateWindow, Frequency, FrequencyData, ProjectedOccurrence, Projection, RecurringTransaction,
    TemplateState, compute_next_due_date, project_instances,
};
pub use rules::{
    ActionType, ConditionType, MatchPolicy, Operator, RULE_MATCH_POLICY, RuleAction,
    RuleCondition, RuleMatch, RuleValue, TransactionRule, TransactionSnapshot, evaluate_rule,
    evaluate_rules,
};
pub use transactions::{Transaction, TransactionDetails, TransactionKind};

mod accounts;
mod categories;
mod commands;
mod currency;
mod error;
mod money;
mod ops;
mod recurring;
mod rules;
mod transactions;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
