//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `CREATE … IF NOT EXISTS` — safe to re-run on every
//! startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS session (
    id                 TEXT PRIMARY KEY NOT NULL,
    name               TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    last_activity_at   TEXT NOT NULL,
    resume_token       TEXT,
    working_directory  TEXT,
    project_id         TEXT
);

CREATE INDEX IF NOT EXISTS idx_session_last_activity ON session(last_activity_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
