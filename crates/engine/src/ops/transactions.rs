mod helpers;
mod list;
mod write;

pub use list::TransactionListFilter;
