//! Archive lifecycle orchestrator.
//!
//! Coordinates identity resolution, record bookkeeping, the
//! fetch-and-compress pipeline, and DOI dispatch, in that strict order.
//! Once a record exists, any downstream failure marks it FAILED
//! best-effort before the error is surfaced; a secondary failure to mark
//! is logged, never escalated.

use crate::models::archive::{
    ArchiveRecord, ArchiveStatus, ArchiveSummary, ArchiveView, CreateArchiveRequest,
    UpdateArchiveRequest,
};
use crate::services::identity::IdentityService;
use crate::services::notifier::DoiNotifier;
use crate::services::pipeline::{FetchPipeline, PipelineError};
use crate::services::repository::ArchiveRepository;
use crate::services::{ArchiveError, ArchiveResult};
use chrono::{Datelike, Utc};
use sqlx::SqlitePool;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tracing::{debug, info, warn};

const INVALID_CREDENTIALS: &str = "Client error - Invalid credentials";

/// Shared application state: the orchestrator over all archive operations.
#[derive(Clone)]
pub struct ArchiveService {
    pub repo: ArchiveRepository,
    pub identity: IdentityService,
    pub pipeline: FetchPipeline,
    pub notifier: DoiNotifier,
    pub storage_dir: PathBuf,
    pub dataservice_url: String,
}

/// An opened artifact ready to stream out.
pub struct ArtifactDownload {
    pub file: File,
    pub content_length: u64,
    pub filename: String,
}

impl ArchiveService {
    pub fn new(
        db: Arc<SqlitePool>,
        pipeline: FetchPipeline,
        notifier: DoiNotifier,
        storage_dir: impl Into<PathBuf>,
        dataservice_url: impl Into<String>,
    ) -> Self {
        Self {
            repo: ArchiveRepository::new(db.clone()),
            identity: IdentityService::new(db),
            pipeline,
            notifier,
            storage_dir: storage_dir.into(),
            dataservice_url: dataservice_url.into(),
        }
    }

    /// The create workflow: authorize, check eligibility, validate input,
    /// insert a PENDING record, fetch, compress, finalize, request a DOI.
    ///
    /// No record exists until every check before the insert has passed.
    pub async fn create_archive(
        &self,
        req: CreateArchiveRequest,
        cookie_session: Option<String>,
    ) -> ArchiveResult<i64> {
        let session_id = non_empty(req.session_id)
            .or(cookie_session)
            .ok_or_else(|| ArchiveError::Authentication("Client error - Invalid session ID".into()))?;
        let identity = self.identity.resolve(&session_id).await?;

        // A failed ORCID lookup means "not eligible", not a server fault.
        let eligible = match self.identity.has_external_id(identity.enterer_no).await {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    "ORCID lookup failed for enterer {}: {err}",
                    identity.enterer_no
                );
                false
            }
        };
        info!("enterer {} has ORCID: {eligible}", identity.enterer_no);
        if !eligible {
            return Err(ArchiveError::MissingOrcid(identity.enterer_no));
        }

        let title = non_empty(req.title)
            .ok_or_else(|| ArchiveError::Validation("Missing title".into()))?;
        let uri_args = non_empty(req.uri_args)
            .ok_or_else(|| ArchiveError::Validation("Missing uri_args".into()))?;
        let uri_path = non_empty(req.uri_path)
            .ok_or_else(|| ArchiveError::Validation("Missing uri_path".into()))?;
        if !uri_path.starts_with('/') {
            return Err(ArchiveError::Validation(
                "uri_path not preceded by \"/\"".into(),
            ));
        }

        let authors = non_empty(req.authors)
            .unwrap_or_else(|| format!("Enter No. {}", identity.enterer_no));
        let description =
            non_empty(req.description).unwrap_or_else(|| "No description".to_string());

        let archive_no = self
            .repo
            .create(
                identity.authorizer_no,
                identity.enterer_no,
                &authors,
                &title,
                &description,
                &uri_path,
                &uri_args,
            )
            .await?;
        info!(
            "record {archive_no} created for enterer {}",
            identity.enterer_no
        );

        let uri = self.build_uri(&uri_path, &uri_args);
        let raw_path = self.raw_path(archive_no);
        match self
            .pipeline
            .fetch_and_store(&uri, &raw_path, Some(&session_id))
            .await
        {
            Ok(outcome) => info!(
                "archive {archive_no}: fetched {} byte(s), {}",
                outcome.bytes_written, outcome.status_line
            ),
            Err(PipelineError::DataService(status_line)) => {
                self.mark_failed(archive_no).await;
                return Err(ArchiveError::DataService {
                    archive_no,
                    status_line,
                });
            }
            Err(err) => {
                self.mark_failed(archive_no).await;
                return Err(ArchiveError::Fetch {
                    archive_no,
                    reason: err.to_string(),
                });
            }
        }

        if let Err(err) = self.pipeline.compress(&raw_path).await {
            self.mark_failed(archive_no).await;
            return Err(ArchiveError::Compression {
                archive_no,
                reason: err.to_string(),
            });
        }

        self.repo
            .set_status(archive_no, ArchiveStatus::Complete)
            .await?;
        info!("created archive {archive_no}");

        self.notifier.request_doi(
            archive_no,
            &title,
            Utc::now().year(),
            &authors,
            identity.enterer_no,
        );

        Ok(archive_no)
    }

    /// Admin-gated metadata update; requires at least one usable field.
    pub async fn update_archive(
        &self,
        archive_no: i64,
        req: UpdateArchiveRequest,
        cookie_session: Option<String>,
    ) -> ArchiveResult<()> {
        let session_id = non_empty(req.session_id.clone())
            .or(cookie_session)
            .ok_or_else(|| ArchiveError::NotAuthorized(INVALID_CREDENTIALS.into()))?;
        self.require_admin(&session_id).await?;

        if req.is_empty() {
            return Err(ArchiveError::Validation("Parameter error".into()));
        }

        self.repo.update_metadata(archive_no, &req).await?;
        info!("updated archive {archive_no}");
        Ok(())
    }

    /// Admin-gated delete of the metadata row and every on-disk artifact.
    pub async fn delete_archive(
        &self,
        archive_no: i64,
        cookie_session: Option<String>,
    ) -> ArchiveResult<()> {
        let session_id = cookie_session
            .ok_or_else(|| ArchiveError::NotAuthorized(INVALID_CREDENTIALS.into()))?;
        self.require_admin(&session_id).await?;

        self.repo.delete(archive_no).await?;

        for path in [
            self.raw_path(archive_no),
            self.header_path(archive_no),
            self.artifact_path(archive_no),
        ] {
            match fs::remove_file(&path).await {
                Ok(_) => debug!("removed {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("{} already missing", path.display());
                }
                Err(err) => return Err(ArchiveError::Io(err)),
            }
        }

        info!("deleted archive {archive_no}");
        Ok(())
    }

    pub async fn list_archives(&self) -> ArchiveResult<Vec<ArchiveSummary>> {
        self.repo.list().await
    }

    /// Single-record view, or None when the number is unknown.
    pub async fn view_archive(&self, archive_no: i64) -> ArchiveResult<Option<ArchiveView>> {
        let record = self.repo.get(archive_no).await?;
        Ok(record.map(|r| ArchiveView::from_record(r, &self.dataservice_url)))
    }

    /// Open the compressed artifact of a COMPLETE archive for streaming.
    pub async fn open_artifact(&self, archive_no: i64) -> ArchiveResult<ArtifactDownload> {
        let record = self
            .repo
            .get(archive_no)
            .await?
            .ok_or(ArchiveError::NotFound(archive_no))?;
        if record.status != ArchiveStatus::Complete {
            return Err(ArchiveError::NotFound(archive_no));
        }

        let path = self.artifact_path(archive_no);
        let file = File::open(&path).await?;
        let content_length = file.metadata().await?.len();
        let filename = format!(
            "pbdb_archive_{archive_no}{}.bz2",
            file_type(&record.uri_path)
        );

        Ok(ArtifactDownload {
            file,
            content_length,
            filename,
        })
    }

    /// Fetch the raw record; used by tests and diagnostics.
    pub async fn get_record(&self, archive_no: i64) -> ArchiveResult<Option<ArchiveRecord>> {
        self.repo.get(archive_no).await
    }

    async fn require_admin(&self, session_id: &str) -> ArchiveResult<()> {
        let admin = match self.identity.is_admin(session_id).await {
            Ok(flag) => flag,
            Err(err) => {
                info!("admin lookup failed: {err}");
                false
            }
        };
        if admin {
            Ok(())
        } else {
            Err(ArchiveError::NotAuthorized(INVALID_CREDENTIALS.into()))
        }
    }

    async fn mark_failed(&self, archive_no: i64) {
        if let Err(err) = self.repo.set_status(archive_no, ArchiveStatus::Failed).await {
            warn!("could not mark archive {archive_no} failed: {err}");
        }
    }

    /// Upstream query URI: base + path + "?" + args, spaces percent-encoded.
    fn build_uri(&self, uri_path: &str, uri_args: &str) -> String {
        let base = self.dataservice_url.trim_end_matches('/');
        format!("{base}{uri_path}?{uri_args}").replace(' ', "%20")
    }

    pub fn raw_path(&self, archive_no: i64) -> PathBuf {
        self.storage_dir.join(archive_no.to_string())
    }

    pub fn header_path(&self, archive_no: i64) -> PathBuf {
        self.storage_dir.join(format!("{archive_no}.header"))
    }

    pub fn artifact_path(&self, archive_no: i64) -> PathBuf {
        self.storage_dir.join(format!("{archive_no}.bz2"))
    }
}

/// Attachment suffix derived from the query path, e.g. `.txt` for
/// `/data1.2/occs/list.txt`.
fn file_type(uri_path: &str) -> String {
    Path::new(uri_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}
