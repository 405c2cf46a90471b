use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, accounts, categories, recurring, rules, transactions,
};

use super::Engine;

/// Generates a `find_` method returning the owned, non-deleted row (if any)
/// and a `require_` method that turns a missing row into `KeyNotFound`.
///
/// Rows owned by another user are indistinguishable from missing ones.
macro_rules! impl_owned_lookup {
    (
        $find_fn:ident,
        $require_fn:ident,
        $entity:path,
        $model:path,
        $owner_col:expr,
        $deleted_col:expr,
        $err_msg:literal
    ) => {
        pub(super) async fn $find_fn(
            &self,
            db: &DatabaseTransaction,
            user_id: &str,
            target_id: Uuid,
        ) -> ResultEngine<Option<$model>> {
            <$entity>::find_by_id(target_id.to_string())
                .filter($owner_col.eq(user_id.to_string()))
                .filter($deleted_col.is_null())
                .one(db)
                .await
                .map_err(Into::into)
        }

        pub(super) async fn $require_fn(
            &self,
            db: &DatabaseTransaction,
            user_id: &str,
            target_id: Uuid,
        ) -> ResultEngine<$model> {
            self.$find_fn(db, user_id, target_id)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound($err_msg.to_string()))
        }
    };
}

impl Engine {
    impl_owned_lookup!(
        find_account,
        require_account,
        accounts::Entity,
        accounts::Model,
        accounts::Column::OwnerId,
        accounts::Column::DeletedAt,
        "account not exists"
    );

    impl_owned_lookup!(
        find_category,
        require_category,
        categories::Entity,
        categories::Model,
        categories::Column::OwnerId,
        categories::Column::DeletedAt,
        "category not exists"
    );

    impl_owned_lookup!(
        find_transaction,
        require_transaction,
        transactions::Entity,
        transactions::Model,
        transactions::Column::CreatedBy,
        transactions::Column::DeletedAt,
        "transaction not exists"
    );

    impl_owned_lookup!(
        find_rule,
        require_rule,
        rules::Entity,
        rules::Model,
        rules::Column::OwnerId,
        rules::Column::DeletedAt,
        "rule not exists"
    );

    impl_owned_lookup!(
        find_recurring,
        require_recurring,
        recurring::Entity,
        recurring::Model,
        recurring::Column::OwnerId,
        recurring::Column::DeletedAt,
        "recurring transaction not exists"
    );

    /// Loads the source account of a posting and, for transfers, its
    /// destination.
    ///
    /// Both accounts must belong to `user_id` and share a currency.
    pub(super) async fn resolve_posting_accounts(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        account_id: Uuid,
        destination_account_id: Option<Uuid>,
    ) -> ResultEngine<(accounts::Account, Option<accounts::Account>)> {
        let Some(destination_id) = destination_account_id else {
            let source = self.require_account(db, user_id, account_id).await?;
            return Ok((accounts::Account::try_from(source)?, None));
        };

        if destination_id == account_id {
            return Err(EngineError::SameAccount);
        }
        let source = self
            .find_account(db, user_id, account_id)
            .await?
            .ok_or(EngineError::SourceNotFound)?;
        let destination = self
            .find_account(db, user_id, destination_id)
            .await?
            .ok_or(EngineError::DestinationNotFound)?;
        let source = accounts::Account::try_from(source)?;
        let destination = accounts::Account::try_from(destination)?;
        crate::util::ensure_same_currency(source.currency, destination.currency)?;
        Ok((source, Some(destination)))
    }

    /// Checks that an optional category belongs to `user_id`.
    pub(super) async fn ensure_category_owned(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        category_id: Option<Uuid>,
    ) -> ResultEngine<()> {
        if let Some(category_id) = category_id {
            self.require_category(db, user_id, category_id).await?;
        }
        Ok(())
    }
}
