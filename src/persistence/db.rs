//! `SQLite` connection bootstrap.
//!
//! Each logical store uses a single-connection pool, so every operation
//! sees a serialized view of the database.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::{AppError, Result};

use super::schema;

/// Alias for the shared database pool.
pub type Database = SqlitePool;

/// Connect to the on-disk database, creating the file and applying the
/// schema if needed.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema bootstrap fails, or
/// `AppError::Io` if the parent directory cannot be created.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| AppError::Io(format!("failed to create db dir: {err}")))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}

/// Connect to a fresh in-memory database with the schema applied.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema bootstrap fails.
pub async fn connect_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().in_memory(true);

    // One connection keeps the in-memory database alive for the pool's
    // whole lifetime.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}
