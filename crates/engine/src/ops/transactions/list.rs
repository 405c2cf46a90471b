use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};

use crate::{EngineError, ResultEngine, Transaction, TransactionKind, transactions};

use super::super::{Engine, with_tx};

/// Filters for listing transactions.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both in UTC.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// If present, acts as an allow-list of kinds to return.
    pub kinds: Option<Vec<TransactionKind>>,
    /// Only rows touching this account, as source or destination.
    pub account_id: Option<Uuid>,
    /// If true, includes soft-deleted transactions (default: false).
    pub include_deleted: bool,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::Validation(
            "invalid range: from must be < to".to_string(),
        ));
    }
    if filter.kinds.as_ref().is_some_and(|k| k.is_empty()) {
        return Err(EngineError::Validation(
            "kinds must not be empty".to_string(),
        ));
    }
    Ok(())
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionListFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionListFilter) -> Self {
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::OccurredAt.lt(to));
        }
        if !filter.include_deleted {
            self = self.filter(transactions::Column::DeletedAt.is_null());
        }
        if let Some(kinds) = &filter.kinds {
            let kinds: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
            self = self.filter(transactions::Column::Kind.is_in(kinds));
        }
        if let Some(account_id) = filter.account_id {
            let account_id = account_id.to_string();
            self = self.filter(
                Condition::any()
                    .add(transactions::Column::AccountId.eq(account_id.clone()))
                    .add(transactions::Column::DestinationAccountId.eq(account_id)),
            );
        }
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TransactionsCursor {
    occurred_at: DateTime<Utc>,
    transaction_id: String,
}

impl TransactionsCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::Validation("invalid transactions cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::Validation("invalid transactions cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::Validation("invalid transactions cursor".to_string()))
    }
}

impl Engine {
    /// Lists the most recent transactions of `user_id`.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: u64,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        let (items, _next) = self
            .list_transactions_page(user_id, limit, None, filter)
            .await?;
        Ok(items)
    }

    /// Lists transactions of `user_id` with cursor-based pagination.
    ///
    /// Pagination is newest → older by `(occurred_at DESC, transaction_id
    /// DESC)`. The returned cursor is `None` on the last page.
    pub async fn list_transactions_page(
        &self,
        user_id: &str,
        limit: u64,
        cursor: Option<&str>,
        filter: &TransactionListFilter,
    ) -> ResultEngine<(Vec<Transaction>, Option<String>)> {
        validate_list_filter(filter)?;
        with_tx!(self, "list_transactions", |db_tx| {
            let limit_plus_one = limit.saturating_add(1);
            let mut query = transactions::Entity::find()
                .filter(transactions::Column::CreatedBy.eq(user_id.to_string()))
                .apply_tx_filters(filter)
                .order_by_desc(transactions::Column::OccurredAt)
                .order_by_desc(transactions::Column::Id)
                .limit(limit_plus_one);

            if let Some(cursor) = cursor {
                let cursor = TransactionsCursor::decode(cursor)?;
                query = query.filter(
                    Condition::any()
                        .add(transactions::Column::OccurredAt.lt(cursor.occurred_at))
                        .add(
                            Condition::all()
                                .add(transactions::Column::OccurredAt.eq(cursor.occurred_at))
                                .add(transactions::Column::Id.lt(cursor.transaction_id)),
                        ),
                );
            }

            let mut models = query.all(&db_tx).await?;
            let has_more = models.len() as u64 > limit;
            models.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

            let next_cursor = match (has_more, models.last()) {
                (true, Some(last)) => Some(
                    TransactionsCursor {
                        occurred_at: last.occurred_at,
                        transaction_id: last.id.clone(),
                    }
                    .encode()?,
                ),
                _ => None,
            };

            let items = models
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            Ok((items, next_cursor))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_survives_encoding() {
        let cursor = TransactionsCursor {
            occurred_at: Utc::now(),
            transaction_id: Uuid::new_v4().to_string(),
        };
        let decoded = TransactionsCursor::decode(&cursor.encode().unwrap()).unwrap();
        assert_eq!(decoded.transaction_id, cursor.transaction_id);
        assert_eq!(decoded.occurred_at, cursor.occurred_at);
    }

    #[test]
    fn garbage_cursor_is_rejected() {
        let err = TransactionsCursor::decode("not a cursor!").unwrap_err();
        assert_eq!(
            err,
            EngineError::Validation("invalid transactions cursor".to_string())
        );
    }

    #[test]
    fn empty_kind_list_is_rejected() {
        let filter = TransactionListFilter {
            kinds: Some(Vec::new()),
            ..TransactionListFilter::default()
        };
        assert!(validate_list_filter(&filter).is_err());
    }
}
