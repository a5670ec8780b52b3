//! HTTP handlers for archive operations.
//!
//! Translates requests into orchestrator calls and renders every outcome
//! as the JSON envelope `{message, status, pbdb_id?}`, except the binary
//! retrieve endpoint which streams the compressed artifact.

use crate::{
    errors::ApiError,
    models::archive::{CreateArchiveRequest, UpdateArchiveRequest},
    services::{ArchiveError, archive_service::ArchiveService},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::Row;
use tokio_util::io::ReaderStream;
use tracing::info;

/// Format the JSON envelope shared by success and error responses.
fn responder(message: &str, status: StatusCode, pbdb_id: Option<i64>) -> Response {
    let mut body = json!({
        "message": message,
        "status": status.as_u16()
    });
    if let Some(id) = pbdb_id {
        body["pbdb_id"] = json!(id);
    }
    (status, Json(body)).into_response()
}

/// Pull the session token out of the browser cookie.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session_id").then(|| value.to_string())
    })
}

/// `GET /` — server listening check.
pub async fn index() -> Response {
    responder("PBDB data archive API running", StatusCode::OK, None)
}

/// Fallback for routes that do not exist.
pub async fn not_found() -> Response {
    info!("404 Not found");
    responder("Not found", StatusCode::NOT_FOUND, None)
}

/// `GET /archives/list` — summaries of all archives.
pub async fn list_archives(
    State(service): State<ArchiveService>,
) -> Result<Response, ApiError> {
    let summaries = service.list_archives().await?;
    Ok(Json(summaries).into_response())
}

/// `GET /archives/view/{archive_no}` — JSON array with one record, or empty.
pub async fn view_archive(
    State(service): State<ArchiveService>,
    Path(archive_no): Path<i64>,
) -> Result<Response, ApiError> {
    let view = service.view_archive(archive_no).await?;
    let rows: Vec<_> = view.into_iter().collect();
    Ok(Json(rows).into_response())
}

/// `GET /archives/retrieve/{archive_no}` — stream the compressed artifact
/// as an attachment.
pub async fn retrieve_archive(
    State(service): State<ArchiveService>,
    Path(archive_no): Path<i64>,
) -> Result<Response, ApiError> {
    if archive_no <= 0 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Unspecified archive number",
        ));
    }

    let download = service.open_artifact(archive_no).await.map_err(|err| {
        info!("retrieval error for archive {archive_no}: {err}");
        ApiError::internal("Retrieval error").with_id(archive_no)
    })?;

    let stream = ReaderStream::new(download.file);
    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-compressed"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&download.content_length.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", download.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

/// `POST /archives/create` — run the create workflow.
pub async fn create_archive(
    State(service): State<ArchiveService>,
    headers: HeaderMap,
    payload: Option<Json<CreateArchiveRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(req)) = payload else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Missing request body",
        ));
    };

    let cookie = session_cookie(&headers);
    let archive_no = service.create_archive(req, cookie).await?;
    Ok(responder("success", StatusCode::OK, Some(archive_no)))
}

/// `POST|GET /archives/update/{archive_no}` — admin metadata update.
pub async fn update_archive(
    State(service): State<ArchiveService>,
    Path(archive_no): Path<i64>,
    headers: HeaderMap,
    payload: Option<Json<UpdateArchiveRequest>>,
) -> Result<Response, ApiError> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let cookie = session_cookie(&headers);

    service
        .update_archive(archive_no, req, cookie)
        .await
        .map_err(|err| match err {
            err @ (ArchiveError::Authentication(_)
            | ArchiveError::NotAuthorized(_)
            | ArchiveError::Validation(_)
            | ArchiveError::NotFound(_)) => ApiError::from(err).with_id(archive_no),
            err => {
                info!("update error for archive {archive_no}: {err}");
                ApiError::internal("Server error - record update").with_id(archive_no)
            }
        })?;

    Ok(responder("Success", StatusCode::OK, Some(archive_no)))
}

/// `GET /archives/delete/{archive_no}` — admin delete of the record and its
/// on-disk artifacts.
pub async fn delete_archive(
    State(service): State<ArchiveService>,
    Path(archive_no): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cookie = session_cookie(&headers);

    service
        .delete_archive(archive_no, cookie)
        .await
        .map_err(|err| match err {
            err @ (ArchiveError::Authentication(_)
            | ArchiveError::NotAuthorized(_)
            | ArchiveError::Validation(_)
            | ArchiveError::NotFound(_)) => ApiError::from(err).with_id(archive_no),
            err => {
                info!("deletion error for archive {archive_no}: {err}");
                ApiError::internal("Deletion error").with_id(archive_no)
            }
        })?;

    Ok(responder("Success", StatusCode::OK, Some(archive_no)))
}

/// `GET /schema` — diagnostic column dump of the archive table.
pub async fn schema(State(service): State<ArchiveService>) -> Result<Response, ApiError> {
    let rows = sqlx::query("PRAGMA table_info(data_archives)")
        .fetch_all(&*service.repo.db)
        .await
        .map_err(|err| ApiError::internal(format!("schema read failed: {err}")))?;

    let columns: Vec<_> = rows
        .iter()
        .map(|row| {
            json!({
                "cid": row.get::<i64, _>("cid"),
                "name": row.get::<String, _>("name"),
                "type": row.get::<String, _>("type"),
                "notnull": row.get::<i64, _>("notnull"),
                "dflt_value": row.get::<Option<String>, _>("dflt_value"),
                "pk": row.get::<i64, _>("pk"),
            })
        })
        .collect();

    Ok(Json(columns).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::archive::ArchiveStatus;
    use crate::routes::routes::routes;
    use crate::services::notifier::DoiNotifier;
    use crate::services::pipeline::FetchPipeline;
    use crate::services::test_util::{memory_pool, seed_person, seed_session};
    use axum::Router;
    use axum::http::Request;
    use axum::routing::{get, post};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const USER: &str = "sess-user";
    const ADMIN: &str = "sess-admin";
    const NO_ORCID: &str = "sess-plain";

    struct Harness {
        app: Router,
        service: ArchiveService,
        doi_hits: Arc<AtomicUsize>,
        _storage: tempfile::TempDir,
    }

    /// In-process stand-in for the upstream data service plus the DOI
    /// endpoint, on an ephemeral loopback port.
    async fn upstream(doi_hits: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route(
                "/data1.2/occs/list.txt",
                get(|| async { "occurrence_no,accepted_name\n1,Canis dirus\n" }),
            )
            .route(
                "/data1.2/occs/broken.txt",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "nope") }),
            )
            .route(
                "/doi",
                post(move || {
                    let hits = doi_hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        StatusCode::OK
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn harness() -> Harness {
        let pool = memory_pool().await;
        seed_session(&pool, USER, 12, 34, false).await;
        seed_session(&pool, ADMIN, 1, 2, true).await;
        seed_session(&pool, NO_ORCID, 12, 35, false).await;
        seed_person(&pool, 34, "J. Doe", Some("0000-0002-1825-0097")).await;
        seed_person(&pool, 2, "A. Admin", Some("0000-0001-5109-3700")).await;
        seed_person(&pool, 35, "R. Roe", None).await;

        let storage = tempfile::tempdir().unwrap();
        let doi_hits = Arc::new(AtomicUsize::new(0));
        let base = upstream(doi_hits.clone()).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let service = ArchiveService::new(
            pool,
            FetchPipeline::new(client.clone()),
            DoiNotifier::new(client, Some(format!("{base}/doi"))),
            storage.path(),
            base,
        );

        Harness {
            app: routes().with_state(service.clone()),
            service,
            doi_hits,
            _storage: storage,
        }
    }

    fn create_body(session: &str) -> Value {
        json!({
            "session_id": session,
            "title": "Test",
            "description": "testing",
            "uri_path": "/data1.2/occs/list.txt",
            "uri_args": "base_name=canis",
        })
    }

    async fn send_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send_get(app: &Router, uri: &str, cookie: Option<&str>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(session) = cookie {
            builder = builder.header(header::COOKIE, format!("session_id={session}"));
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    async fn create_ok(h: &Harness, session: &str) -> i64 {
        let (status, body) = send_json(&h.app, "POST", "/archives/create", create_body(session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "success");
        let pbdb_id = body["pbdb_id"].as_i64().unwrap();
        assert!(pbdb_id > 0);
        pbdb_id
    }

    #[tokio::test]
    async fn index_reports_running() {
        let h = harness().await;
        let (status, _, body) = send_get(&h.app, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "PBDB data archive API running");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let h = harness().await;
        let (status, _, body) = send_get(&h.app, "/archives/bogus", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Not found");
        assert_eq!(value["status"], 404);
    }

    #[tokio::test]
    async fn create_view_list_retrieve_round_trip() {
        let h = harness().await;
        let pbdb_id = create_ok(&h, USER).await;

        // view: array with exactly this record
        let (status, _, body) = send_get(&h.app, &format!("/archives/view/{pbdb_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let rows: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        let record = &rows[0];
        assert_eq!(record["archive_no"].as_i64().unwrap(), pbdb_id);
        assert_eq!(record["title"], "Test");
        assert_eq!(record["status"], "complete");
        assert!(record["doi"].is_null());
        assert!(record["uri_base"].as_str().unwrap().starts_with("http://127.0.0.1:"));
        assert!(record.get("created").is_some());

        // list: contains the new archive
        let (status, _, body) = send_get(&h.app, "/archives/list", None).await;
        assert_eq!(status, StatusCode::OK);
        let list: Value = serde_json::from_slice(&body).unwrap();
        assert!(
            list.as_array()
                .unwrap()
                .iter()
                .any(|a| a["archive_no"].as_i64() == Some(pbdb_id))
        );

        // retrieve: compressed attachment with the canonical filename
        let (status, headers, bytes) =
            send_get(&h.app, &format!("/archives/retrieve/{pbdb_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "application/x-compressed"
        );
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(disposition.contains(&format!("pbdb_archive_{pbdb_id}")));
        assert!(disposition.ends_with(".txt.bz2\""));
        assert!(bytes.starts_with(b"BZh"));
    }

    #[tokio::test]
    async fn view_is_idempotent_until_update() {
        let h = harness().await;
        let pbdb_id = create_ok(&h, USER).await;
        let uri = format!("/archives/view/{pbdb_id}");

        let (_, _, first) = send_get(&h.app, &uri, None).await;
        let (_, _, second) = send_get(&h.app, &uri, None).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn session_cookie_is_the_fallback_credential() {
        let h = harness().await;
        let mut body = create_body(USER);
        body["session_id"] = Value::Null;

        let request = Request::builder()
            .method("POST")
            .uri("/archives/create")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("session_id={USER}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_rejects_bad_input_without_persisting() {
        let h = harness().await;

        let mut body = create_body(USER);
        body.as_object_mut().unwrap().remove("title");
        let (status, resp) = send_json(&h.app, "POST", "/archives/create", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "Missing title");

        let mut body = create_body(USER);
        body["uri_path"] = json!("data1.2/occs/list.txt");
        let (status, _) = send_json(&h.app, "POST", "/archives/create", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut body = create_body(USER);
        body["uri_args"] = json!("");
        let (status, resp) = send_json(&h.app, "POST", "/archives/create", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "Missing uri_args");

        let (_, _, body) = send_get(&h.app, "/archives/list", None).await;
        let list: Value = serde_json::from_slice(&body).unwrap();
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_requires_orcid() {
        let h = harness().await;
        let (status, resp) =
            send_json(&h.app, "POST", "/archives/create", create_body(NO_ORCID)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(resp["message"], "Missing ORCID");

        let (_, _, body) = send_get(&h.app, "/archives/list", None).await;
        let list: Value = serde_json::from_slice(&body).unwrap();
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_unknown_session() {
        let h = harness().await;
        let (status, resp) =
            send_json(&h.app, "POST", "/archives/create", create_body("ghost")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "Client error - Invalid session ID");
    }

    #[tokio::test]
    async fn failed_fetch_marks_record_failed_and_blocks_retrieve() {
        let h = harness().await;
        let mut body = create_body(USER);
        body["uri_path"] = json!("/data1.2/occs/broken.txt");

        let (status, resp) = send_json(&h.app, "POST", "/archives/create", body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp["message"], "Server error - Data service");
        let pbdb_id = resp["pbdb_id"].as_i64().unwrap();

        let record = h.service.get_record(pbdb_id).await.unwrap().unwrap();
        assert_eq!(record.status, ArchiveStatus::Failed);

        let (status, _, body) =
            send_get(&h.app, &format!("/archives/retrieve/{pbdb_id}"), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let resp: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["message"], "Retrieval error");
    }

    #[tokio::test]
    async fn successful_create_requests_a_doi() {
        let h = harness().await;
        create_ok(&h, USER).await;

        // the dispatch is fire-and-forget on its own task; give it a moment
        for _ in 0..40 {
            if h.doi_hits.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(h.doi_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_round_trip_truncates_title() {
        let h = harness().await;
        let pbdb_id = create_ok(&h, USER).await;

        let long_title: String = "t".repeat(300);
        let (status, resp) = send_json(
            &h.app,
            "POST",
            &format!("/archives/update/{pbdb_id}"),
            json!({ "session_id": ADMIN, "title": long_title }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["message"], "Success");
        assert_eq!(resp["pbdb_id"].as_i64(), Some(pbdb_id));

        let (_, _, body) = send_get(&h.app, &format!("/archives/view/{pbdb_id}"), None).await;
        let rows: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows[0]["title"].as_str().unwrap().len(), 255);
    }

    #[tokio::test]
    async fn update_requires_admin_and_a_field() {
        let h = harness().await;
        let pbdb_id = create_ok(&h, USER).await;

        let (status, resp) = send_json(
            &h.app,
            "POST",
            &format!("/archives/update/{pbdb_id}"),
            json!({ "session_id": USER, "title": "hijack" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "Client error - Invalid credentials");

        let (status, resp) = send_json(
            &h.app,
            "POST",
            &format!("/archives/update/{pbdb_id}"),
            json!({ "session_id": ADMIN }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "Parameter error");

        let (_, _, body) = send_get(&h.app, &format!("/archives/view/{pbdb_id}"), None).await;
        let rows: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows[0]["title"], "Test");
    }

    #[tokio::test]
    async fn delete_requires_admin() {
        let h = harness().await;
        let pbdb_id = create_ok(&h, USER).await;

        let (status, _, _) =
            send_get(&h.app, &format!("/archives/delete/{pbdb_id}"), Some(USER)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // record survives a rejected delete
        let (_, _, body) = send_get(&h.app, "/archives/list", None).await;
        let list: Value = serde_json::from_slice(&body).unwrap();
        assert!(
            list.as_array()
                .unwrap()
                .iter()
                .any(|a| a["archive_no"].as_i64() == Some(pbdb_id))
        );
    }

    #[tokio::test]
    async fn admin_delete_removes_record_and_artifacts() {
        let h = harness().await;
        let pbdb_id = create_ok(&h, USER).await;
        let artifact = h.service.artifact_path(pbdb_id);
        assert!(artifact.exists());

        let (status, _, body) =
            send_get(&h.app, &format!("/archives/delete/{pbdb_id}"), Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        let resp: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["message"], "Success");

        let (_, _, body) = send_get(&h.app, &format!("/archives/view/{pbdb_id}"), None).await;
        let rows: Value = serde_json::from_slice(&body).unwrap();
        assert!(rows.as_array().unwrap().is_empty());
        assert!(!artifact.exists());
        assert!(!h.service.header_path(pbdb_id).exists());
    }

    #[tokio::test]
    async fn retrieve_rejects_unspecified_archive_number() {
        let h = harness().await;
        let (status, _, body) = send_get(&h.app, "/archives/retrieve/0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let resp: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["message"], "Unspecified archive number");
    }

    #[tokio::test]
    async fn schema_lists_archive_columns() {
        let h = harness().await;
        let (status, _, body) = send_get(&h.app, "/schema", None).await;
        assert_eq!(status, StatusCode::OK);
        let columns: Value = serde_json::from_slice(&body).unwrap();
        let names: Vec<&str> = columns
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"archive_no"));
        assert!(names.contains(&"status"));
        assert!(names.contains(&"doi"));
    }
}
