use std::collections::{BTreeMap, HashMap};

use sea_orm::{
    ActiveValue, Condition, DatabaseTransaction, QueryFilter, QuerySelect, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, Transaction, accounts, transactions};

use super::{Engine, with_tx};

/// Net balance change per account produced by one unit of work.
///
/// Keyed by account id so rows are always locked in the same order.
#[derive(Debug, Default)]
pub(super) struct BalanceDeltas(BTreeMap<Uuid, Money>);

impl BalanceDeltas {
    pub(super) fn apply(&mut self, tx: &Transaction) {
        for (account_id, amount) in tx.balance_effects() {
            *self.0.entry(account_id).or_insert(Money::ZERO) += amount;
        }
    }

    pub(super) fn reverse(&mut self, tx: &Transaction) {
        for (account_id, amount) in tx.balance_effects() {
            *self.0.entry(account_id).or_insert(Money::ZERO) -= amount;
        }
    }

    fn non_zero(&self) -> impl Iterator<Item = (Uuid, Money)> + '_ {
        self.0
            .iter()
            .filter(|(_, delta)| !delta.is_zero())
            .map(|(account_id, delta)| (*account_id, *delta))
    }
}

/// A balance write prepared from a locked read.
///
/// `read` is the stored text the new balance was computed from; the write
/// only lands if the row still holds it.
#[derive(Debug)]
pub(super) struct BalanceWrite {
    account_id: Uuid,
    read: String,
    balance: Money,
}

/// An account whose stored balance disagreed with its ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceMismatch {
    pub account_id: Uuid,
    pub account_name: String,
    pub stored: Money,
    pub computed: Money,
}

impl Engine {
    /// Reads the affected accounts under lock and computes their new
    /// balances, without writing anything.
    ///
    /// `guarded` names the account that must not be overdrawn by this change
    /// (the source of a transfer).
    pub(super) async fn preview_balance_updates(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        deltas: &BalanceDeltas,
        guarded: Option<Uuid>,
    ) -> ResultEngine<Vec<BalanceWrite>> {
        let changes: Vec<(Uuid, Money)> = deltas.non_zero().collect();
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = changes.iter().map(|(id, _)| id.to_string()).collect();
        let mut models: HashMap<String, accounts::Model> = accounts::Entity::find()
            .filter(accounts::Column::Id.is_in(ids))
            .filter(accounts::Column::OwnerId.eq(user_id.to_string()))
            .lock_exclusive()
            .all(db_tx)
            .await?
            .into_iter()
            .map(|model| (model.id.clone(), model))
            .collect();

        let mut writes = Vec::with_capacity(changes.len());
        for (account_id, delta) in changes {
            let model = models
                .remove(&account_id.to_string())
                .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
            let current = Money::from_storage(&model.balance, "balance")?;
            let balance = current
                .checked_add(delta)
                .ok_or_else(|| EngineError::InvalidAmount("balance overflow".to_string()))?;
            if guarded == Some(account_id) && delta.is_negative() && balance.is_negative() {
                return Err(EngineError::InsufficientBalance(model.name));
            }
            writes.push(BalanceWrite {
                account_id,
                read: model.balance,
                balance,
            });
        }
        Ok(writes)
    }

    /// Writes prepared balances with a compare-and-swap on the value read.
    ///
    /// A row changed since the read yields `ConcurrentUpdate` and the caller's
    /// transaction is rolled back.
    pub(super) async fn persist_balances(
        &self,
        db_tx: &DatabaseTransaction,
        writes: Vec<BalanceWrite>,
    ) -> ResultEngine<()> {
        for write in writes {
            let result = accounts::Entity::update_many()
                .col_expr(
                    accounts::Column::Balance,
                    Expr::value(write.balance.to_storage()),
                )
                .filter(accounts::Column::Id.eq(write.account_id.to_string()))
                .filter(accounts::Column::Balance.eq(write.read))
                .exec(db_tx)
                .await?;
            if result.rows_affected != 1 {
                return Err(EngineError::ConcurrentUpdate(format!(
                    "balance of account {} changed during the update",
                    write.account_id
                )));
            }
        }
        Ok(())
    }

    /// Recomputes every account balance of `user_id` from its non-deleted
    /// transactions and repairs the stored value where they disagree.
    ///
    /// Returns the accounts that had drifted.
    pub async fn recompute_balances(&self, user_id: &str) -> ResultEngine<Vec<BalanceMismatch>> {
        with_tx!(self, "recompute_balances", |db_tx| {
            let account_models = accounts::Entity::find()
                .filter(accounts::Column::OwnerId.eq(user_id.to_string()))
                .lock_exclusive()
                .all(&db_tx)
                .await?;
            let accounts: Vec<accounts::Account> = account_models
                .into_iter()
                .map(accounts::Account::try_from)
                .collect::<ResultEngine<_>>()?;

            let mut computed: HashMap<Uuid, Money> = accounts
                .iter()
                .map(|account| (account.id, Money::ZERO))
                .collect();
            let ids: Vec<String> = accounts.iter().map(|a| a.id.to_string()).collect();

            let tx_models = transactions::Entity::find()
                .filter(transactions::Column::DeletedAt.is_null())
                .filter(
                    Condition::any()
                        .add(transactions::Column::AccountId.is_in(ids.clone()))
                        .add(transactions::Column::DestinationAccountId.is_in(ids)),
                )
                .all(&db_tx)
                .await?;
            for model in tx_models {
                let tx = Transaction::try_from(model)?;
                for (account_id, amount) in tx.balance_effects() {
                    if let Some(total) = computed.get_mut(&account_id) {
                        *total += amount;
                    }
                }
            }

            let mut mismatches = Vec::new();
            for account in accounts {
                let expected = computed.get(&account.id).copied().unwrap_or(Money::ZERO);
                if account.balance == expected {
                    continue;
                }
                accounts::ActiveModel {
                    id: ActiveValue::Set(account.id.to_string()),
                    balance: ActiveValue::Set(expected.to_storage()),
                    ..Default::default()
                }
                .update(&db_tx)
                .await?;
                mismatches.push(BalanceMismatch {
                    account_id: account.id,
                    account_name: account.name,
                    stored: account.balance,
                    computed: expected,
                });
            }

            if !mismatches.is_empty() {
                tracing::warn!(
                    user_id,
                    repaired = mismatches.len(),
                    "account balances drifted from the ledger"
                );
            }
            Ok(mismatches)
        })
    }
}
