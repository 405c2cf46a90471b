use chrono::Utc;
use sea_orm::{ActiveModelTrait, TransactionTrait};

use crate::{
    EngineError, ResultEngine, Transaction, TransactionKind, UpdateTransactionCmd, transactions,
    util::{apply_optional_text_patch, ensure_positive_amount},
};

use super::super::super::{Engine, balances::BalanceDeltas, with_tx};
use super::super::helpers::normalize_tags;

impl Engine {
    /// Patches a transaction, reversing its old balance effect and applying
    /// the new one in the same DB transaction.
    ///
    /// Income and expense may swap kinds; a transfer stays a transfer.
    pub async fn update_transaction(&self, cmd: UpdateTransactionCmd) -> ResultEngine<Transaction> {
        if let Some(amount) = cmd.amount {
            ensure_positive_amount(amount, "amount")?;
        }
        if cmd.clear_category && cmd.category_id.is_some() {
            return Err(EngineError::Validation(
                "category cannot be set and cleared at once".to_string(),
            ));
        }

        with_tx!(self, "update_transaction", |db_tx| {
            let model = self
                .require_transaction(&db_tx, &cmd.user_id, cmd.transaction_id)
                .await?;
            let old = Transaction::try_from(model)?;
            if !cmd.has_changes() {
                return Ok(old);
            }

            let mut new = old.clone();
            if let Some(kind) = cmd.kind {
                let was_transfer = old.kind == TransactionKind::Transfer;
                if was_transfer != (kind == TransactionKind::Transfer) {
                    return Err(EngineError::Validation(
                        "a transaction cannot be turned into or out of a transfer".to_string(),
                    ));
                }
                new.kind = kind;
            }
            if let Some(account_id) = cmd.account_id {
                new.account_id = account_id;
            }
            if let Some(destination) = cmd.destination_account_id {
                if new.kind != TransactionKind::Transfer {
                    return Err(EngineError::Validation(
                        "only transfers have a destination account".to_string(),
                    ));
                }
                new.destination_account_id = Some(destination);
            }

            let (source, _) = self
                .resolve_posting_accounts(
                    &db_tx,
                    &cmd.user_id,
                    new.account_id,
                    new.destination_account_id,
                )
                .await?;
            let magnitude = cmd.amount.unwrap_or_else(|| old.magnitude());
            source.currency.ensure_precision(magnitude)?;
            new.currency = source.currency;
            new.amount = new.kind.signed(magnitude);

            if cmd.clear_category {
                new.category_id = None;
            } else if let Some(category_id) = cmd.category_id {
                self.require_category(&db_tx, &cmd.user_id, category_id)
                    .await?;
                new.category_id = Some(category_id);
            }
            new.description =
                apply_optional_text_patch(new.description, cmd.description.as_deref());
            new.details.note = apply_optional_text_patch(new.details.note, cmd.note.as_deref());
            if let Some(tags) = cmd.tags.clone() {
                new.details.tags = normalize_tags(tags);
            }
            if let Some(occurred_at) = cmd.occurred_at {
                new.occurred_at = occurred_at;
            }
            new.updated_by = Some(cmd.user_id.clone());
            new.updated_at = Utc::now();

            let mut deltas = BalanceDeltas::default();
            deltas.reverse(&old);
            deltas.apply(&new);
            let guarded = (new.kind == TransactionKind::Transfer).then_some(new.account_id);
            let writes = self
                .preview_balance_updates(&db_tx, &cmd.user_id, &deltas, guarded)
                .await?;

            transactions::ActiveModel::try_from(&new)?
                .update(&db_tx)
                .await?;
            self.persist_balances(&db_tx, writes).await?;
            Ok(new)
        })
    }
}
