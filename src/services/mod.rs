//! Service layer: identity resolution, archive persistence, the
//! fetch-and-compress pipeline, DOI dispatch, and the orchestrator that
//! ties them together.

pub mod archive_service;
pub mod identity;
pub mod notifier;
pub mod pipeline;
pub mod repository;

use thiserror::Error;

/// Failure taxonomy shared across the service modules.
///
/// Every variant translates to exactly one HTTP status and message at the
/// workflow boundary (see `crate::errors`); nothing here escapes to the
/// transport layer unhandled.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Session token absent, malformed, or unknown.
    #[error("{0}")]
    Authentication(String),

    /// Enterer lacks the external identifier required for archive creation.
    #[error("enterer {0} has no ORCID")]
    MissingOrcid(i64),

    /// Session is valid but lacks the rights for this operation.
    #[error("{0}")]
    NotAuthorized(String),

    /// Malformed or incomplete request payload.
    #[error("{0}")]
    Validation(String),

    /// No archive row with this number.
    #[error("archive {0} not found")]
    NotFound(i64),

    /// The initial PENDING insert failed; no record exists.
    #[error("record creation failed: {0}")]
    RecordCreation(#[source] sqlx::Error),

    /// Any other database failure.
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),

    /// The upstream transfer failed before a response was validated.
    #[error("retrieval failed for archive {archive_no}: {reason}")]
    Fetch { archive_no: i64, reason: String },

    /// The upstream answered, but not with a 200.
    #[error("data service error for archive {archive_no}: {status_line}")]
    DataService { archive_no: i64, status_line: String },

    /// Compressing the fetched payload failed.
    #[error("compression failed for archive {archive_no}: {reason}")]
    Compression { archive_no: i64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
