//! Durable local storage.
//!
//! One `SQLite` database holds both the message cache ([`InboxStore`]) and
//! small key/value metadata ([`PreferenceStore`]). Both are handed the same
//! pool so they always see the same database.

mod model;
mod preferences;
mod repository;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub use model::Message;
pub use preferences::PreferenceStore;
pub use repository::InboxStore;

use crate::Result;

/// Opens (creating if needed) the database file at `path`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub async fn open_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Opens a private in-memory database, used by tests.
///
/// Limited to one connection that is never recycled, since every new
/// connection to `sqlite::memory:` would see an empty database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
