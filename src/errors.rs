use crate::services::ArchiveError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A failed request, rendered as the JSON envelope `{message, status,
/// pbdb_id?}` that every non-binary endpoint speaks.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub pbdb_id: Option<i64>,
}

impl ApiError {
    /// Create a new ApiError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            pbdb_id: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Attach the archive number, unless the error already carries one.
    pub fn with_id(mut self, archive_no: i64) -> Self {
        self.pbdb_id.get_or_insert(archive_no);
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "message": self.message,
            "status": self.status.as_u16()
        });
        if let Some(id) = self.pbdb_id {
            body["pbdb_id"] = json!(id);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Authentication(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            ArchiveError::MissingOrcid(_) => Self::new(StatusCode::FORBIDDEN, "Missing ORCID"),
            ArchiveError::NotAuthorized(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            ArchiveError::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            ArchiveError::NotFound(archive_no) => {
                Self::new(StatusCode::NOT_FOUND, "Not found").with_id(archive_no)
            }
            ArchiveError::RecordCreation(_) => Self::internal("Server error - Record creation"),
            ArchiveError::Persistence(_) => Self::internal("Server error - database"),
            ArchiveError::Fetch { archive_no, .. } => {
                Self::internal("Server error - File retrieval").with_id(archive_no)
            }
            ArchiveError::DataService { archive_no, .. } => {
                Self::internal("Server error - Data service").with_id(archive_no)
            }
            ArchiveError::Compression { archive_no, .. } => {
                Self::internal("Server error - File compression").with_id(archive_no)
            }
            ArchiveError::Io(_) => Self::internal("Server error - file system"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}
