//! Represents a data archive: a stored, compressed snapshot of a remote
//! query result plus its metadata row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of an archive record.
///
/// A record starts as `Pending` and moves exactly once to `Complete` or
/// `Failed`. Stored lowercase in the `status` column.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ArchiveStatus {
    Pending,
    Complete,
    Failed,
}

/// A single archive record as persisted in `data_archives`.
///
/// The metadata row is owned by the repository; the compressed payload
/// lives on disk under the storage root, addressed by `archive_no`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ArchiveRecord {
    /// System-assigned identifier, unique and immutable once created.
    pub archive_no: i64,

    /// Accountable data owner, resolved from the session at creation.
    pub authorizer_no: i64,

    /// Acting user, resolved from the session at creation.
    pub enterer_no: i64,

    /// Free-text author list shown in citations.
    pub authors: String,

    /// Archive title (truncated to 255 characters).
    pub title: String,

    /// Longer description (truncated to 5000 characters).
    pub description: Option<String>,

    /// Persistent identifier, assigned after creation by an external
    /// process. Always absent on a freshly created record.
    pub doi: Option<String>,

    /// Path component of the upstream data-service query.
    pub uri_path: String,

    /// Query-string component of the upstream data-service query.
    pub uri_args: String,

    /// Creation timestamp.
    pub created: DateTime<Utc>,

    /// Timestamp of the last metadata or status change.
    pub modified: DateTime<Utc>,

    /// Lifecycle status.
    pub status: ArchiveStatus,
}

/// Projection returned by the list endpoint.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ArchiveSummary {
    pub archive_no: i64,
    pub title: String,
    pub doi: Option<String>,
    pub authors: String,
    pub created: DateTime<Utc>,
    pub description: Option<String>,
    pub status: ArchiveStatus,
}

/// Shape returned by the view endpoint: the full record plus the configured
/// data-service base, so a client can reconstruct the original query.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ArchiveView {
    pub archive_no: i64,
    pub authorizer_no: i64,
    pub enterer_no: i64,
    pub authors: String,
    pub title: String,
    pub description: Option<String>,
    pub doi: Option<String>,
    pub uri_base: String,
    pub uri_path: String,
    pub uri_args: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub status: ArchiveStatus,
}

impl ArchiveView {
    pub fn from_record(record: ArchiveRecord, uri_base: &str) -> Self {
        Self {
            archive_no: record.archive_no,
            authorizer_no: record.authorizer_no,
            enterer_no: record.enterer_no,
            authors: record.authors,
            title: record.title,
            description: record.description,
            doi: record.doi,
            uri_base: uri_base.to_string(),
            uri_path: record.uri_path,
            uri_args: record.uri_args,
            created: record.created,
            modified: record.modified,
            status: record.status,
        }
    }
}

/// Request body for `POST /archives/create`.
///
/// `session_id` in the body overrides the browser cookie; that path exists
/// for test harnesses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArchiveRequest {
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub authors: Option<String>,
    pub uri_path: Option<String>,
    pub uri_args: Option<String>,
}

/// Request body for `POST /archives/update/{archive_no}`.
///
/// All fields optional; at least one non-empty field is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArchiveRequest {
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub authors: Option<String>,
    pub doi: Option<String>,
}

impl UpdateArchiveRequest {
    /// True when no field carries a usable value.
    pub fn is_empty(&self) -> bool {
        fn blank(field: &Option<String>) -> bool {
            field.as_deref().map(str::trim).unwrap_or("").is_empty()
        }
        blank(&self.title) && blank(&self.description) && blank(&self.authors) && blank(&self.doi)
    }
}
