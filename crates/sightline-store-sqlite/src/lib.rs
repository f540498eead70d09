//! SQLite backend for the Sightline visit tracker.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each store call executes one unit of
//! work on that thread with its own [`TransactionContext`].
//!
//! [`TransactionContext`]: sightline_core::transaction::TransactionContext

mod encode;
mod pipeline;
mod repo;
mod schema;
mod session;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use session::SqliteSession;
pub use store::{SqliteStore, StoreOptions};
