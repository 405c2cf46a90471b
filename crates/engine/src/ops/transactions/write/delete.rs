use chrono::Utc;
use sea_orm::{ActiveModelTrait, TransactionTrait};
use uuid::Uuid;

use crate::{ResultEngine, Transaction, transactions};

use super::super::super::{Engine, balances::BalanceDeltas, with_tx};

impl Engine {
    /// Soft-deletes a transaction and takes its effect back out of the
    /// account balances.
    ///
    /// Deleted rows stay readable through listings with `include_deleted`.
    pub async fn delete_transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, "delete_transaction", |db_tx| {
            let model = self
                .require_transaction(&db_tx, user_id, transaction_id)
                .await?;
            let mut tx = Transaction::try_from(model)?;

            let mut deltas = BalanceDeltas::default();
            deltas.reverse(&tx);
            let writes = self
                .preview_balance_updates(&db_tx, user_id, &deltas, None)
                .await?;

            let now = Utc::now();
            tx.deleted_at = Some(now);
            tx.updated_at = now;
            tx.updated_by = Some(user_id.to_string());
            transactions::ActiveModel::try_from(&tx)?
                .update(&db_tx)
                .await?;
            self.persist_balances(&db_tx, writes).await?;
            Ok(())
        })
    }
}
