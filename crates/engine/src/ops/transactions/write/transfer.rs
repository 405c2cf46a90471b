use chrono::Utc;
use sea_orm::TransactionTrait;

use crate::{
    EngineError, ResultEngine, Transaction, TransactionKind, TransferCmd,
    util::{ensure_positive_amount, normalize_optional_text},
};

use super::super::super::{Engine, with_tx};
use super::super::helpers::build_details;

impl Engine {
    /// Moves money between two accounts of the same user as one atomic row.
    ///
    /// The source must cover the amount; both accounts must share a currency.
    pub async fn post_transfer(&self, cmd: TransferCmd) -> ResultEngine<Transaction> {
        if cmd.from_account_id == cmd.to_account_id {
            return Err(EngineError::SameAccount);
        }
        ensure_positive_amount(cmd.amount, "amount")?;

        let TransferCmd {
            user_id,
            from_account_id,
            to_account_id,
            amount,
            occurred_at,
            category_id,
            description,
            note,
        } = cmd;

        with_tx!(self, "post_transfer", |db_tx| {
            let (source, destination) = self
                .resolve_posting_accounts(&db_tx, &user_id, from_account_id, Some(to_account_id))
                .await?;
            source.currency.ensure_precision(amount)?;
            self.ensure_category_owned(&db_tx, &user_id, category_id)
                .await?;

            let mut tx = Transaction::new(
                TransactionKind::Transfer,
                source.id,
                destination.map(|account| account.id),
                amount,
                source.currency,
                occurred_at,
                user_id.clone(),
                Utc::now(),
            )?;
            tx.category_id = category_id;
            tx.description = normalize_optional_text(description.as_deref());
            tx.details = build_details(note.as_deref(), Vec::new());

            self.insert_with_balances(&db_tx, &user_id, &tx).await?;
            Ok(tx)
        })
    }
}
