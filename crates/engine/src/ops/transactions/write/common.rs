use sea_orm::{ActiveModelTrait, DatabaseTransaction};

use crate::{ResultEngine, Transaction, TransactionKind, transactions};

use super::super::super::{Engine, balances::BalanceDeltas};

impl Engine {
    /// Inserts a new transaction row and applies its balance effects in the
    /// same DB transaction.
    ///
    /// The source of a transfer must cover the amount.
    pub(in crate::ops) async fn insert_with_balances(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        tx: &Transaction,
    ) -> ResultEngine<()> {
        let mut deltas = BalanceDeltas::default();
        deltas.apply(tx);
        let guarded = (tx.kind == TransactionKind::Transfer).then_some(tx.account_id);
        let writes = self
            .preview_balance_updates(db_tx, user_id, &deltas, guarded)
            .await?;

        transactions::ActiveModel::try_from(tx)?
            .insert(db_tx)
            .await?;
        self.persist_balances(db_tx, writes).await
    }
}
