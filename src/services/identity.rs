//! Maps opaque session tokens to authorizer/enterer identities and
//! authorization flags.
//!
//! All lookups are side-effect-free reads against tables seeded by the
//! login system; this service never writes them. Failed lookups surface
//! immediately, there are no retries.

use crate::models::identity::Identity;
use crate::services::{ArchiveError, ArchiveResult};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct IdentityService {
    pub db: Arc<SqlitePool>,
}

impl IdentityService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Resolve a session token to its identity pair.
    ///
    /// An absent or unknown token is an authentication failure; callers
    /// surface it as-is without creating any record.
    pub async fn resolve(&self, session_id: &str) -> ArchiveResult<Identity> {
        sqlx::query_as::<_, Identity>(
            "SELECT authorizer_no, enterer_no, superuser AS is_admin \
             FROM session_data WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => {
                ArchiveError::Authentication("Client error - Invalid session ID".into())
            }
            other => ArchiveError::Persistence(other),
        })
    }

    /// Whether the enterer has a qualifying external identifier (ORCID).
    ///
    /// Fails when the person row itself is missing; callers treat that as
    /// "not eligible" rather than as a fault.
    pub async fn has_external_id(&self, enterer_no: i64) -> ArchiveResult<bool> {
        let orcid = sqlx::query_scalar::<_, Option<String>>(
            "SELECT orcid FROM people WHERE person_no = ?",
        )
        .bind(enterer_no)
        .fetch_one(&*self.db)
        .await?;

        Ok(orcid.map(|v| !v.trim().is_empty()).unwrap_or(false))
    }

    /// Whether the session carries superuser rights.
    ///
    /// Fails when the session is unknown; callers treat that as "not
    /// eligible" rather than as a fault.
    pub async fn is_admin(&self, session_id: &str) -> ArchiveResult<bool> {
        let superuser =
            sqlx::query_scalar::<_, bool>("SELECT superuser FROM session_data WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&*self.db)
                .await?;

        Ok(superuser)
    }
}
