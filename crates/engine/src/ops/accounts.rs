use chrono::Utc;
use sea_orm::{ActiveModelTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Account, Category, Currency, EngineError, ResultEngine, accounts, categories,
    util::normalize_required_name,
};

use super::{Engine, with_tx};

impl Engine {
    /// Opens a new account with a zero balance.
    ///
    /// Account names are unique per owner.
    pub async fn new_account(
        &self,
        name: &str,
        currency: Currency,
        user_id: &str,
    ) -> ResultEngine<Uuid> {
        let name = normalize_required_name(name, "account")?;
        with_tx!(self, "new_account", |db_tx| {
            let duplicate = accounts::Entity::find()
                .filter(accounts::Column::OwnerId.eq(user_id.to_string()))
                .filter(accounts::Column::Name.eq(name.clone()))
                .filter(accounts::Column::DeletedAt.is_null())
                .one(&db_tx)
                .await?;
            if duplicate.is_some() {
                return Err(EngineError::Validation(format!(
                    "account {name} already exists"
                )));
            }

            let account = Account::new(user_id.to_string(), name, currency, Utc::now());
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;
            Ok(account.id)
        })
    }

    pub async fn account(&self, account_id: Uuid, user_id: &str) -> ResultEngine<Account> {
        with_tx!(self, "account", |db_tx| {
            let model = self.require_account(&db_tx, user_id, account_id).await?;
            Account::try_from(model)
        })
    }

    /// Accounts of `user_id`, by name.
    pub async fn list_accounts(&self, user_id: &str) -> ResultEngine<Vec<Account>> {
        with_tx!(self, "list_accounts", |db_tx| {
            let models = accounts::Entity::find()
                .filter(accounts::Column::OwnerId.eq(user_id.to_string()))
                .filter(accounts::Column::DeletedAt.is_null())
                .order_by_asc(accounts::Column::Name)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(Account::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    pub async fn new_category(&self, name: &str, user_id: &str) -> ResultEngine<Uuid> {
        let name = normalize_required_name(name, "category")?;
        with_tx!(self, "new_category", |db_tx| {
            let duplicate = categories::Entity::find()
                .filter(categories::Column::OwnerId.eq(user_id.to_string()))
                .filter(categories::Column::Name.eq(name.clone()))
                .filter(categories::Column::DeletedAt.is_null())
                .one(&db_tx)
                .await?;
            if duplicate.is_some() {
                return Err(EngineError::Validation(format!(
                    "category {name} already exists"
                )));
            }

            let category = Category::new(user_id.to_string(), name, Utc::now());
            categories::ActiveModel::from(&category).insert(&db_tx).await?;
            Ok(category.id)
        })
    }

    pub async fn category(&self, category_id: Uuid, user_id: &str) -> ResultEngine<Category> {
        with_tx!(self, "category", |db_tx| {
            let model = self.require_category(&db_tx, user_id, category_id).await?;
            Category::try_from(model)
        })
    }

    pub async fn list_categories(&self, user_id: &str) -> ResultEngine<Vec<Category>> {
        with_tx!(self, "list_categories", |db_tx| {
            let models = categories::Entity::find()
                .filter(categories::Column::OwnerId.eq(user_id.to_string()))
                .filter(categories::Column::DeletedAt.is_null())
                .order_by_asc(categories::Column::Name)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(Category::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;

    use super::*;
    use migration::MigratorTrait;

    async fn engine_with_db() -> Engine {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        Engine::builder().database(db).build().await.unwrap()
    }

    #[tokio::test]
    async fn accounts_are_scoped_to_their_owner() {
        let engine = engine_with_db().await;
        let id = engine
            .new_account("Checking", Currency::Eur, "alice")
            .await
            .unwrap();

        let account = engine.account(id, "alice").await.unwrap();
        assert_eq!(account.name, "Checking");
        assert!(account.balance.is_zero());

        let err = engine.account(id, "bob").await.unwrap_err();
        assert_eq!(err, EngineError::KeyNotFound("account not exists".to_string()));
        assert!(engine.list_accounts("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_per_owner() {
        let engine = engine_with_db().await;
        engine
            .new_account("Checking", Currency::Eur, "alice")
            .await
            .unwrap();

        let err = engine
            .new_account("  Checking ", Currency::Eur, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        engine
            .new_account("Checking", Currency::Eur, "bob")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn categories_are_listed_by_name() {
        let engine = engine_with_db().await;
        engine.new_category("Rent", "alice").await.unwrap();
        engine.new_category("Groceries", "alice").await.unwrap();

        let names: Vec<String> = engine
            .list_categories("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Groceries".to_string(), "Rent".to_string()]);
    }
}
