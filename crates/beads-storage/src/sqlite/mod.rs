//! SQLite-backed storage implementation.

mod config;
mod dependencies;
mod issues;
mod labels;
pub mod schema;
mod spawn;
mod store;
mod transaction;

pub use store::SqliteStore;
