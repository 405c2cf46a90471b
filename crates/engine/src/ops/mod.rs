use sea_orm::DatabaseConnection;

use crate::ResultEngine;

mod access;
mod accounts;
mod balances;
mod recurring;
mod rules;
mod transactions;

pub use balances::BalanceMismatch;
pub use recurring::{DueOutcome, RecurringListFilter, RecurringStats, UpcomingInstances};
pub use transactions::TransactionListFilter;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
///
/// Errors leaving the block are tagged with the operation name.
macro_rules! with_tx {
    ($self:expr, $op:literal, |$tx:ident| $body:expr) => {{
        let result: Result<_, $crate::EngineError> = async {
            let $tx = $self.database.begin().await?;
            let result = $body;
            match result {
                Ok(value) => {
                    $tx.commit().await?;
                    Ok::<_, $crate::EngineError>(value)
                }
                Err(err) => Err(err),
            }
        }
        .await;
        result.map_err(|err| err.with_operation($op))
    }};
}

pub(crate) use with_tx;

#[derive(Clone, Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
