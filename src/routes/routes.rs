//! Defines routes for the data archive API.
//!
//! ## Structure
//! - **Service endpoints**
//!   - `GET  /`        — server listening check
//!   - `GET  /healthz` — liveness
//!   - `GET  /readyz`  — readiness (DB + storage I/O)
//!   - `GET  /schema`  — diagnostic column dump of the archive table
//!
//! - **Archive endpoints**
//!   - `GET      /archives/list`                  — archive summaries
//!   - `GET      /archives/view/{archive_no}`     — single-record view
//!   - `GET      /archives/retrieve/{archive_no}` — compressed artifact download
//!   - `POST     /archives/create`                — create workflow
//!   - `POST|GET /archives/update/{archive_no}`   — admin metadata update
//!   - `GET      /archives/delete/{archive_no}`   — admin delete
//!
//! Unknown routes fall through to a JSON 404.

use crate::{
    handlers::{
        archive_handlers::{
            create_archive, delete_archive, index, list_archives, not_found, retrieve_archive,
            schema, update_archive, view_archive,
        },
        health_handlers::{healthz, readyz},
    },
    services::archive_service::ArchiveService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for all archive routes.
///
/// The router carries shared state (`ArchiveService`) to all handlers.
pub fn routes() -> Router<ArchiveService> {
    Router::new()
        // service endpoints (mounted at root)
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/schema", get(schema))
        // archive endpoints
        .route("/archives/list", get(list_archives))
        .route("/archives/view/{archive_no}", get(view_archive))
        .route("/archives/retrieve/{archive_no}", get(retrieve_archive))
        .route("/archives/create", post(create_archive))
        .route(
            "/archives/update/{archive_no}",
            post(update_archive).get(update_archive),
        )
        .route("/archives/delete/{archive_no}", get(delete_archive))
        .fallback(not_found)
}
