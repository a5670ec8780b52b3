//! Persistent store of archive records.
//!
//! Owns every read and write of the `data_archives` table. Each operation
//! borrows a connection from the shared pool for its own duration and all
//! values travel through bind parameters. The insert returns the generated
//! archive number directly, so callers never re-query for it.

use crate::models::archive::{ArchiveRecord, ArchiveStatus, ArchiveSummary, UpdateArchiveRequest};
use crate::services::{ArchiveError, ArchiveResult};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;

const MAX_TITLE_CHARS: usize = 255;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_AUTHORS_CHARS: usize = 255;
const MAX_DOI_CHARS: usize = 100;

const RECORD_COLUMNS: &str = "archive_no, authorizer_no, enterer_no, authors, title, \
     description, doi, uri_path, uri_args, created, modified, status";

/// Repository for `ArchiveRecord` rows.
#[derive(Clone)]
pub struct ArchiveRepository {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl ArchiveRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a PENDING record and return its assigned archive number.
    ///
    /// The number comes back from the insert itself, so two concurrent
    /// creates by the same enterer can never observe each other's row.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        authorizer_no: i64,
        enterer_no: i64,
        authors: &str,
        title: &str,
        description: &str,
        uri_path: &str,
        uri_args: &str,
    ) -> ArchiveResult<i64> {
        let now = Utc::now();
        let archive_no = sqlx::query_scalar::<_, i64>(
            "INSERT INTO data_archives \
                 (authorizer_no, enterer_no, authors, title, description, \
                  uri_path, uri_args, created, modified, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING archive_no",
        )
        .bind(authorizer_no)
        .bind(enterer_no)
        .bind(clip(authors, MAX_AUTHORS_CHARS))
        .bind(clip(title, MAX_TITLE_CHARS))
        .bind(clip(description, MAX_DESCRIPTION_CHARS))
        .bind(uri_path)
        .bind(uri_args)
        .bind(now)
        .bind(now)
        .bind(ArchiveStatus::Pending)
        .fetch_one(&*self.db)
        .await
        .map_err(ArchiveError::RecordCreation)?;

        Ok(archive_no)
    }

    /// Fetch a single record, or None when the number is unknown.
    pub async fn get(&self, archive_no: i64) -> ArchiveResult<Option<ArchiveRecord>> {
        let record = sqlx::query_as::<_, ArchiveRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM data_archives WHERE archive_no = ?"
        ))
        .bind(archive_no)
        .fetch_optional(&*self.db)
        .await?;

        Ok(record)
    }

    /// List all archive summaries in archive-number order.
    pub async fn list(&self) -> ArchiveResult<Vec<ArchiveSummary>> {
        let rows = sqlx::query_as::<_, ArchiveSummary>(
            "SELECT archive_no, title, doi, authors, created, description, status \
             FROM data_archives ORDER BY archive_no",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(rows)
    }

    /// Apply the provided, non-empty metadata fields and touch `modified`.
    ///
    /// Each field is independently truncated to its column limit rather
    /// than rejected. Untouched fields keep their prior value.
    pub async fn update_metadata(
        &self,
        archive_no: i64,
        fields: &UpdateArchiveRequest,
    ) -> ArchiveResult<()> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE data_archives SET modified = ");
        builder.push_bind(Utc::now());

        if let Some(title) = usable(&fields.title) {
            builder.push(", title = ");
            builder.push_bind(clip(title, MAX_TITLE_CHARS));
        }
        if let Some(description) = usable(&fields.description) {
            builder.push(", description = ");
            builder.push_bind(clip(description, MAX_DESCRIPTION_CHARS));
        }
        if let Some(authors) = usable(&fields.authors) {
            builder.push(", authors = ");
            builder.push_bind(clip(authors, MAX_AUTHORS_CHARS));
        }
        if let Some(doi) = usable(&fields.doi) {
            builder.push(", doi = ");
            builder.push_bind(clip(doi, MAX_DOI_CHARS));
        }

        builder.push(" WHERE archive_no = ");
        builder.push_bind(archive_no);

        let result = builder.build().execute(&*self.db).await?;
        if result.rows_affected() == 0 {
            return Err(ArchiveError::Persistence(sqlx::Error::RowNotFound));
        }

        Ok(())
    }

    /// Write a terminal status. Repeated writes overwrite.
    pub async fn set_status(&self, archive_no: i64, status: ArchiveStatus) -> ArchiveResult<()> {
        let result =
            sqlx::query("UPDATE data_archives SET status = ?, modified = ? WHERE archive_no = ?")
                .bind(status)
                .bind(Utc::now())
                .bind(archive_no)
                .execute(&*self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ArchiveError::NotFound(archive_no));
        }

        Ok(())
    }

    /// Remove the metadata row. Artifact removal is the orchestrator's job.
    pub async fn delete(&self, archive_no: i64) -> ArchiveResult<()> {
        let result = sqlx::query("DELETE FROM data_archives WHERE archive_no = ?")
            .bind(archive_no)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ArchiveError::NotFound(archive_no));
        }

        Ok(())
    }
}

/// Truncate to a character limit without splitting a code point.
fn clip(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Treat missing and blank strings alike: neither updates a column.
fn usable(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
