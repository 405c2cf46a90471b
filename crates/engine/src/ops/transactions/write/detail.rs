use sea_orm::TransactionTrait;
use uuid::Uuid;

use crate::{ResultEngine, Transaction};

use super::super::super::{Engine, with_tx};

impl Engine {
    /// Returns a non-deleted transaction created by `user_id`.
    pub async fn transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<Transaction> {
        with_tx!(self, "transaction", |db_tx| {
            let model = self
                .require_transaction(&db_tx, user_id, transaction_id)
                .await?;
            Transaction::try_from(model)
        })
    }
}
