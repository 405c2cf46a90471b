//! Initial schema.
//!
//! - `accounts`: money containers with a denormalized balance
//! - `categories`: user-owned transaction labels
//! - `transactions`: ledger rows, one per income, expense or transfer
//! - `transaction_rules`: categorization rules with JSON conditions/actions
//! - `recurring_transactions`: templates the scheduler materializes
//!
//! Amounts are stored as canonical decimal text.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    OwnerId,
    Name,
    Currency,
    Balance,
    CreatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum Categories {
    Table,
    Id,
    OwnerId,
    Name,
    CreatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    Kind,
    AccountId,
    DestinationAccountId,
    Amount,
    Currency,
    CategoryId,
    Description,
    Details,
    OccurredAt,
    RecurringId,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum TransactionRules {
    Table,
    Id,
    OwnerId,
    Name,
    Active,
    Priority,
    Conditions,
    Actions,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum RecurringTransactions {
    Table,
    Id,
    OwnerId,
    AccountId,
    DestinationAccountId,
    Kind,
    Amount,
    CategoryId,
    Description,
    Frequency,
    FrequencyInterval,
    FrequencyData,
    StartDate,
    EndDate,
    NextDueDate,
    LastGeneratedDate,
    AutoPost,
    Paused,
    OccurrencesCount,
    MaxOccurrences,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::OwnerId).string().not_null())
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::Currency)
                            .string()
                            .not_null()
                            .default("EUR"),
                    )
                    .col(
                        ColumnDef::new(Accounts::Balance)
                            .string()
                            .not_null()
                            .default("0"),
                    )
                    .col(ColumnDef::new(Accounts::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Accounts::DeletedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-owner_id-name")
                    .table(Accounts::Table)
                    .col(Accounts::OwnerId)
                    .col(Accounts::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Categories::OwnerId).string().not_null())
                    .col(ColumnDef::new(Categories::Name).string().not_null())
                    .col(ColumnDef::new(Categories::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Categories::DeletedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-categories-owner_id-name")
                    .table(Categories::Table)
                    .col(Categories::OwnerId)
                    .col(Categories::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(ColumnDef::new(Transactions::AccountId).string().not_null())
                    .col(ColumnDef::new(Transactions::DestinationAccountId).string())
                    .col(ColumnDef::new(Transactions::Amount).string().not_null())
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(ColumnDef::new(Transactions::CategoryId).string())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(ColumnDef::new(Transactions::Details).text())
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::RecurringId).string())
                    .col(ColumnDef::new(Transactions::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Transactions::UpdatedBy).string())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::DeletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-account_id")
                            .from(Transactions::Table, Transactions::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-destination_account_id")
                            .from(Transactions::Table, Transactions::DestinationAccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-created_by-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::CreatedBy)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-destination_account_id")
                    .table(Transactions::Table)
                    .col(Transactions::DestinationAccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TransactionRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionRules::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TransactionRules::OwnerId).string().not_null())
                    .col(ColumnDef::new(TransactionRules::Name).string().not_null())
                    .col(
                        ColumnDef::new(TransactionRules::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TransactionRules::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(TransactionRules::Conditions).text().not_null())
                    .col(ColumnDef::new(TransactionRules::Actions).text().not_null())
                    .col(
                        ColumnDef::new(TransactionRules::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionRules::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransactionRules::DeletedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transaction_rules-owner_id-priority")
                    .table(TransactionRules::Table)
                    .col(TransactionRules::OwnerId)
                    .col(TransactionRules::Priority)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RecurringTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecurringTransactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RecurringTransactions::OwnerId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringTransactions::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringTransactions::DestinationAccountId).string())
                    .col(ColumnDef::new(RecurringTransactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(RecurringTransactions::Amount)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringTransactions::CategoryId).string())
                    .col(ColumnDef::new(RecurringTransactions::Description).string())
                    .col(
                        ColumnDef::new(RecurringTransactions::Frequency)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringTransactions::FrequencyInterval)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(RecurringTransactions::FrequencyData).text())
                    .col(
                        ColumnDef::new(RecurringTransactions::StartDate)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringTransactions::EndDate).timestamp())
                    .col(
                        ColumnDef::new(RecurringTransactions::NextDueDate)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringTransactions::LastGeneratedDate).timestamp())
                    .col(
                        ColumnDef::new(RecurringTransactions::AutoPost)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RecurringTransactions::Paused)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RecurringTransactions::OccurrencesCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(RecurringTransactions::MaxOccurrences).big_integer())
                    .col(
                        ColumnDef::new(RecurringTransactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringTransactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringTransactions::DeletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-recurring_transactions-account_id")
                            .from(RecurringTransactions::Table, RecurringTransactions::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-recurring_transactions-next_due_date")
                    .table(RecurringTransactions::Table)
                    .col(RecurringTransactions::Paused)
                    .col(RecurringTransactions::NextDueDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-recurring_transactions-owner_id")
                    .table(RecurringTransactions::Table)
                    .col(RecurringTransactions::OwnerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order of creation (FK dependencies).
        manager
            .drop_table(Table::drop().table(RecurringTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TransactionRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
