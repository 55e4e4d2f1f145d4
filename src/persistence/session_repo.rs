//! Session record repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::session::SessionRecord;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for durable session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    name: String,
    created_at: String,
    last_activity_at: String,
    resume_token: Option<String>,
    working_directory: Option<String>,
    project_id: Option<String>,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord> {
        Ok(SessionRecord {
            id: self.id,
            name: self.name,
            created_at: parse_timestamp(&self.created_at)?,
            last_activity_at: parse_timestamp(&self.last_activity_at)?,
            resume_token: self.resume_token,
            working_directory: self.working_directory,
            project_id: self.project_id,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid timestamp: {err}")))
}

const SELECT_COLUMNS: &str = "id, name, created_at, last_activity_at, \
                              resume_token, working_directory, project_id";

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, record: &SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO session (id, name, created_at, last_activity_at,
                                  resume_token, working_directory, project_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.created_at.to_rfc3339())
        .bind(record.last_activity_at.to_rfc3339())
        .bind(&record.resume_token)
        .bind(&record.working_directory)
        .bind(&record.project_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Retrieve a session record by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<SessionRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM session WHERE id = ?1");
        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(SessionRow::into_record).transpose()
    }

    /// Delete a session record. Deleting a missing record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Update `last_activity_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE session SET last_activity_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(at.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Null out the resume token, downgrading the record to fresh-only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn clear_resume_token(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE session SET resume_token = NULL WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Store the resume token reported by the external CLI.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_resume_token(&self, id: &str, token: &str) -> Result<()> {
        sqlx::query("UPDATE session SET resume_token = ?2 WHERE id = ?1")
            .bind(id)
            .bind(token)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Set the owning-project back-reference.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_project(&self, id: &str, project_id: &str) -> Result<()> {
        sqlx::query("UPDATE session SET project_id = ?2 WHERE id = ?1")
            .bind(id)
            .bind(project_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Update the display name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        sqlx::query("UPDATE session SET name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// List records with `last_activity_at` at or after `cutoff`, most
    /// recently active first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_recent(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM session
             WHERE last_activity_at >= ?1
             ORDER BY last_activity_at DESC"
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&query)
            .bind(cutoff.to_rfc3339())
            .fetch_all(self.db.as_ref())
            .await?;
        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Delete records last active before `cutoff`, except the given ids.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        exclude: &[String],
    ) -> Result<u64> {
        let cutoff_str = cutoff.to_rfc3339();
        let result = if exclude.is_empty() {
            sqlx::query("DELETE FROM session WHERE last_activity_at < ?1")
                .bind(&cutoff_str)
                .execute(self.db.as_ref())
                .await?
        } else {
            // Placeholders are generated from the slice length, never from
            // user-controlled text.
            let placeholders = (0..exclude.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let query = format!(
                "DELETE FROM session
                 WHERE last_activity_at < ?1 AND id NOT IN ({placeholders})"
            );
            let mut stmt = sqlx::query(&query).bind(&cutoff_str);
            for id in exclude {
                stmt = stmt.bind(id);
            }
            stmt.execute(self.db.as_ref()).await?
        };
        Ok(result.rows_affected())
    }
}
