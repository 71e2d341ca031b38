//! One volume's download: create the file, fetch, validate, retry.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

use super::constants::OCTET_STREAM;
use super::engine::DownloadStats;
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy};
use crate::session::{MoxSession, SessionError};

/// A queued download of one volume asset.
///
/// Owned by the worker that runs it; the retry counter lives inside
/// [`DownloadJob::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    volume_id: String,
    volume_name: String,
    url: String,
    destination: PathBuf,
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedVolume {
    /// Where the file was written.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
}

impl DownloadJob {
    /// Creates a job for `url`, written to `destination`.
    #[must_use]
    pub fn new(
        volume_id: impl Into<String>,
        volume_name: impl Into<String>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            volume_id: volume_id.into(),
            volume_name: volume_name.into(),
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Volume identifier.
    #[must_use]
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Volume display name.
    #[must_use]
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    /// Absolute asset URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Destination file path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Runs the job to completion.
    ///
    /// The destination is created (truncated) before any request. A bad
    /// status or content type is retried immediately until `policy` gives up,
    /// which leaves an empty file behind. Transport failures return at once
    /// and remove the file. The file handle is closed on every path.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::FileCreate`] if the destination cannot be created
    /// - [`DownloadError::RetriesExhausted`] once the retry budget is spent
    /// - [`DownloadError::Network`] / [`DownloadError::Io`] for transport or
    ///   disk failures
    #[instrument(
        skip_all,
        fields(volume_id = %self.volume_id, volume = %self.volume_name, url = %self.url)
    )]
    pub async fn run(
        &self,
        session: &MoxSession,
        policy: &RetryPolicy,
        stats: &DownloadStats,
    ) -> Result<DownloadedVolume, DownloadError> {
        debug!(path = %self.destination.display(), "creating destination");
        let file = File::create(&self.destination)
            .await
            .map_err(|e| DownloadError::file_create(&self.destination, e))?;
        let mut writer = BufWriter::new(file);

        let outcome = self.fetch_into(&mut writer, session, policy, stats).await;
        drop(writer);

        if matches!(
            outcome,
            Err(DownloadError::Network { .. } | DownloadError::Io { .. })
        ) {
            debug!(path = %self.destination.display(), "removing partial file after error");
            let _ = tokio::fs::remove_file(&self.destination).await;
        }
        outcome
    }

    async fn fetch_into(
        &self,
        writer: &mut BufWriter<File>,
        session: &MoxSession,
        policy: &RetryPolicy,
        stats: &DownloadStats,
    ) -> Result<DownloadedVolume, DownloadError> {
        let mut failures = 0u32;

        loop {
            let attempt = failures.saturating_add(1);
            debug!(attempt, "requesting asset");

            let response = session
                .get(&self.url)
                .await
                .map_err(|e| DownloadError::network(&self.url, e))?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            if is_asset_response(status, content_type.as_deref()) {
                let bytes = stream_to_file(writer, response, &self.url, &self.destination).await?;
                return Ok(DownloadedVolume {
                    path: self.destination.clone(),
                    bytes,
                    attempts: attempt,
                });
            }

            // Drain the rejected body so the connection returns to the pool.
            let _ = response.bytes().await;
            failures = failures.saturating_add(1);

            match policy.should_retry(failures) {
                RetryDecision::Retry { attempt: next } => {
                    warn!(
                        path = %self.destination.display(),
                        status = status.as_u16(),
                        content_type = content_type.as_deref().unwrap_or(""),
                        retry = failures,
                        next_attempt = next,
                        "download failed, retrying"
                    );
                    stats.increment_retried();
                }
                RetryDecision::Abandon { attempts } => {
                    return Err(DownloadError::RetriesExhausted {
                        url: self.url.clone(),
                        path: self.destination.clone(),
                        attempts,
                        last_status: status.as_u16(),
                        last_content_type: content_type,
                    });
                }
            }
        }
    }
}

/// Accepts only `200` responses whose content type names an octet stream.
fn is_asset_response(status: StatusCode, content_type: Option<&str>) -> bool {
    status == StatusCode::OK
        && content_type.is_some_and(|value| value.to_ascii_lowercase().contains(OCTET_STREAM))
}

/// Streams the response body into `writer`, returning bytes written.
async fn stream_to_file(
    writer: &mut BufWriter<File>,
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| DownloadError::network(url, SessionError::from_send(url, e)))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
    Ok(bytes_written)
}
