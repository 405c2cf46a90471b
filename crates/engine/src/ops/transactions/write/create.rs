use chrono::Utc;
use sea_orm::TransactionTrait;

use crate::{
    EngineError, PostTransactionCmd, ResultEngine, Transaction, TransactionKind,
    util::{ensure_positive_amount, normalize_optional_text},
};

use super::super::super::{Engine, with_tx};
use super::super::helpers::build_details;

impl Engine {
    /// Records an income or expense against one of the user's accounts and
    /// moves its balance by the signed amount.
    pub async fn post_transaction(&self, cmd: PostTransactionCmd) -> ResultEngine<Transaction> {
        if cmd.kind == TransactionKind::Transfer {
            return Err(EngineError::Validation(
                "transfers are posted with post_transfer".to_string(),
            ));
        }
        ensure_positive_amount(cmd.amount, "amount")?;

        let PostTransactionCmd {
            user_id,
            account_id,
            kind,
            amount,
            occurred_at,
            category_id,
            description,
            note,
            tags,
        } = cmd;

        with_tx!(self, "post_transaction", |db_tx| {
            let (account, _) = self
                .resolve_posting_accounts(&db_tx, &user_id, account_id, None)
                .await?;
            account.currency.ensure_precision(amount)?;
            self.ensure_category_owned(&db_tx, &user_id, category_id)
                .await?;

            let mut tx = Transaction::new(
                kind,
                account.id,
                None,
                amount,
                account.currency,
                occurred_at,
                user_id.clone(),
                Utc::now(),
            )?;
            tx.category_id = category_id;
            tx.description = normalize_optional_text(description.as_deref());
            tx.details = build_details(note.as_deref(), tags);

            self.insert_with_balances(&db_tx, &user_id, &tx).await?;
            Ok(tx)
        })
    }
}
