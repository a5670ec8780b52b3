//! Fire-and-forget DOI request dispatch.
//!
//! Once an archive is finalized, a persistent-identifier request goes out
//! to an external endpoint. The dispatch runs on its own task; its failure
//! is logged and never reaches the create workflow's outcome. With no
//! endpoint configured the whole mechanism is disabled.

use serde_json::json;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct DoiNotifier {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl DoiNotifier {
    pub fn new(client: reqwest::Client, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }

    /// Request a persistent identifier for a finalized archive.
    ///
    /// Returns immediately; the POST happens on a spawned task.
    pub fn request_doi(&self, archive_no: i64, title: &str, year: i32, authors: &str, enterer_no: i64) {
        let Some(endpoint) = self.endpoint.clone() else {
            debug!("DOI requests disabled; skipping archive {archive_no}");
            return;
        };

        let payload = json!({
            "archive_no": archive_no,
            "title": title,
            "year": year,
            "authors": authors,
            "enterer_no": enterer_no,
        });
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.post(&endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("DOI request sent for archive {archive_no}");
                }
                Ok(response) => {
                    warn!(
                        "DOI request for archive {archive_no} rejected: {}",
                        response.status()
                    );
                }
                Err(err) => {
                    warn!("DOI request for archive {archive_no} failed: {err}");
                }
            }
        });
    }
}
