//! SQLite backend for the Strata object store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The single-writer connection also
//! linearizes appends per object: the end-dating of a superseded record and
//! the insert of its successor commit in one transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
