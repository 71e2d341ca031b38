//! Error types for a single volume download.
//!
//! These errors never abort a batch: the coordinator logs them, counts the
//! volume as failed, and moves on.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionError;

/// Errors that can end one volume's download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The destination file could not be created; no request was sent.
    #[error("cannot create {path}: {source}")]
    FileCreate {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the response body to disk failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No response arrived, or the body stream broke. Not retried.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The asset URL.
        url: String,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// Every attempt answered with a bad status or content type.
    #[error("download failed: {path} (HTTP {last_status}) [retry={attempts}]")]
    RetriesExhausted {
        /// The asset URL.
        url: String,
        /// Destination path (left empty on disk).
        path: PathBuf,
        /// Number of attempts made.
        attempts: u32,
        /// Status of the last response.
        last_status: u16,
        /// Content type of the last response, if any.
        last_content_type: Option<String>,
    },
}

impl DownloadError {
    /// Creates a `FileCreate` error.
    #[must_use]
    pub fn file_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a `Network` error.
    #[must_use]
    pub fn network(url: impl Into<String>, source: SessionError) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Returns true when the failure happened below HTTP (no usable response).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Number of HTTP attempts made before this error, when known.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
