//! Fetch-and-compress pipeline.
//!
//! Retrieves a remote payload to disk, records the transfer's status line
//! and headers next to it, validates the transfer, and compresses the
//! payload in place. Owns the artifact bytes, never the metadata row.
//!
//! No retries: each failure is terminal for the calling workflow. The
//! client-wide timeout bounds a hung upstream, surfacing it as a transfer
//! error.

use async_compression::tokio::write::BzEncoder;
use futures::StreamExt;
use reqwest::header;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The transfer itself failed: connection, timeout, or a dropped body.
    #[error("transfer failed: {0}")]
    Transfer(String),
    /// The upstream answered with something other than a 200.
    #[error("data service returned `{0}`")]
    DataService(String),
    /// Compressing the fetched payload failed.
    #[error("compression failed: {0}")]
    Compression(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of a validated transfer.
#[derive(Debug)]
pub struct FetchOutcome {
    /// First line of the recorded response header file, e.g. `HTTP/1.1 200 OK`.
    pub status_line: String,
    /// Payload bytes written to the destination file.
    pub bytes_written: u64,
}

#[derive(Clone)]
pub struct FetchPipeline {
    client: reqwest::Client,
}

impl FetchPipeline {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Retrieve `uri` into `dest`, recording the response status line and
    /// headers to `dest + ".header"`.
    ///
    /// The body streams through a temp file that is renamed into place only
    /// after a complete, synced write. Success requires the header record
    /// to exist and its first line to carry a 200 token; anything else
    /// leaves no partial file behind at `dest`.
    pub async fn fetch_and_store(
        &self,
        uri: &str,
        dest: &Path,
        session_cookie: Option<&str>,
    ) -> Result<FetchOutcome, PipelineError> {
        let mut request = self.client.get(uri);
        if let Some(token) = session_cookie {
            request = request.header(header::COOKIE, format!("session_id={token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| PipelineError::Transfer(err.to_string()))?;

        // Record the transfer metadata before draining the body, the way
        // `curl -D` would.
        let status_line = format!("{:?} {}", response.version(), response.status());
        let mut header_record = String::with_capacity(256);
        header_record.push_str(&status_line);
        header_record.push_str("\r\n");
        for (name, value) in response.headers() {
            header_record.push_str(name.as_str());
            header_record.push_str(": ");
            header_record.push_str(value.to_str().unwrap_or(""));
            header_record.push_str("\r\n");
        }
        let header_path = sibling_path(dest, ".header");
        fs::write(&header_path, header_record).await?;

        // Stream the body into a temp file, then rename into place.
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| PipelineError::Transfer("destination has no parent directory".into()))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut bytes_written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(PipelineError::Transfer(err.to_string()));
                }
            };
            bytes_written += chunk.len() as u64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(PipelineError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::Io(err));
        }

        // Validate the transfer from the recorded header file.
        let recorded = fs::read_to_string(&header_path)
            .await
            .map_err(|_| PipelineError::Transfer("response header record missing".into()))?;
        let first_line = recorded.lines().next().unwrap_or("").to_string();
        if !first_line.contains("200") {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::DataService(first_line));
        }

        fs::rename(&tmp_path, dest).await?;
        debug!(
            "fetched {} byte(s) from {} into {}",
            bytes_written,
            uri,
            dest.display()
        );

        Ok(FetchOutcome {
            status_line: first_line,
            bytes_written,
        })
    }

    /// Compress `src` into `src + ".bz2"` and remove the original,
    /// mirroring an in-place `bzip2 -f`.
    pub async fn compress(&self, src: &Path) -> Result<PathBuf, PipelineError> {
        let dst = sibling_path(src, ".bz2");

        let mut input = File::open(src)
            .await
            .map_err(|err| PipelineError::Compression(err.to_string()))?;
        let output = File::create(&dst)
            .await
            .map_err(|err| PipelineError::Compression(err.to_string()))?;

        let mut encoder = BzEncoder::new(output);
        tokio::io::copy(&mut input, &mut encoder)
            .await
            .map_err(|err| PipelineError::Compression(err.to_string()))?;
        encoder
            .shutdown()
            .await
            .map_err(|err| PipelineError::Compression(err.to_string()))?;

        fs::remove_file(src).await?;
        debug!("compressed {} into {}", src.display(), dst.display());

        Ok(dst)
    }
}

/// Append a suffix to a path without touching its existing extension.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
