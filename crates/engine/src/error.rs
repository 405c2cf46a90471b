//! The module contains the errors the engine can throw.
//!
//! Errors fall into four classes (see [`ErrorClass`]):
//!
//! - validation and invariant errors ([`SameAccount`], [`InsufficientBalance`],
//!   [`Validation`], ...) are rejected before any mutation and can be fixed by
//!   the caller;
//! - ownership errors ([`SourceNotFound`], [`DestinationNotFound`],
//!   [`KeyNotFound`]) never reveal whether a row owned by someone else exists;
//! - [`ConcurrentUpdate`] signals a lost race on an account balance;
//! - persistence errors ([`Database`], [`Persistence`]) are internal.
//!
//!  [`SameAccount`]: EngineError::SameAccount
//!  [`InsufficientBalance`]: EngineError::InsufficientBalance
//!  [`Validation`]: EngineError::Validation
//!  [`SourceNotFound`]: EngineError::SourceNotFound
//!  [`DestinationNotFound`]: EngineError::DestinationNotFound
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`ConcurrentUpdate`]: EngineError::ConcurrentUpdate
//!  [`Database`]: EngineError::Database
//!  [`Persistence`]: EngineError::Persistence
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("source and destination accounts must differ")]
    SameAccount,
    #[error("source account not found")]
    SourceNotFound,
    #[error("destination account not found")]
    DestinationNotFound,
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Concurrent update: {0}")]
    ConcurrentUpdate(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: DbErr,
    },
}

/// Coarse classification of an [`EngineError`], used by callers to pick a
/// response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request can be corrected by the caller.
    BadRequest,
    /// The request conflicts with the current state (balances, races).
    Conflict,
    /// The referenced row does not exist or is not visible to the caller.
    NotFound,
    Internal,
}

impl EngineError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::SameAccount
            | Self::InvalidAmount(_)
            | Self::Validation(_)
            | Self::InvalidRule(_)
            | Self::CurrencyMismatch(_) => ErrorClass::BadRequest,
            Self::InsufficientBalance(_) | Self::ConcurrentUpdate(_) => ErrorClass::Conflict,
            Self::SourceNotFound | Self::DestinationNotFound | Self::KeyNotFound(_) => {
                ErrorClass::NotFound
            }
            Self::Serialization(_) | Self::Database(_) | Self::Persistence { .. } => {
                ErrorClass::Internal
            }
        }
    }

    /// Attach the name of the failing operation to a raw database error.
    ///
    /// Non-database errors are returned unchanged.
    #[must_use]
    pub fn with_operation(self, operation: &'static str) -> Self {
        match self {
            Self::Database(source) => Self::Persistence { operation, source },
            other => other,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::SameAccount, Self::SameAccount) => true,
            (Self::SourceNotFound, Self::SourceNotFound) => true,
            (Self::DestinationNotFound, Self::DestinationNotFound) => true,
            (Self::InsufficientBalance(a), Self::InsufficientBalance(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InvalidRule(a), Self::InvalidRule(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::ConcurrentUpdate(a), Self::ConcurrentUpdate(b)) => a == b,
            (Self::Serialization(a), Self::Serialization(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            (
                Self::Persistence {
                    operation: op_a,
                    source: a,
                },
                Self::Persistence {
                    operation: op_b,
                    source: b,
                },
            ) => op_a == op_b && a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
