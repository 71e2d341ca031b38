//! Error types for catalog scraping.
//!
//! Every variant is fatal to a batch: the coordinator aborts before any
//! volume download starts.

use thiserror::Error;

use crate::session::SessionError;

/// Errors that can occur while turning a series ID into a volume list.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request could not be sent or no response arrived.
    #[error("request to {url} failed: {source}")]
    Request {
        /// The URL being fetched.
        url: String,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// The catalog page answered with a status other than 200 or 404.
    #[error("unexpected HTTP {status} from {url}")]
    UnexpectedStatus {
        /// The URL being fetched.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body could not be read as text.
    #[error("malformed response body from {url}: {source}")]
    MalformedResponse {
        /// The URL being fetched.
        url: String,
        /// The underlying body read error.
        #[source]
        source: reqwest::Error,
    },

    /// The catalog page carries no `book_data.php` reference.
    #[error("book data reference not found on catalog page of series {series_id}")]
    BookDataNotFound {
        /// The series being scraped.
        series_id: u64,
    },

    /// The metadata endpoint returned no `volinfo` records.
    #[error("volinfo not found in {url}")]
    VolInfoNotFound {
        /// The metadata endpoint URL.
        url: String,
    },

    /// A `volinfo` record has too few fields to carry an ID and a name.
    #[error("malformed volinfo record '{record}': expected at least {expected} fields, got {found}")]
    MalformedVolumeRecord {
        /// The raw record text.
        record: String,
        /// Minimum field count.
        expected: usize,
        /// Actual field count.
        found: usize,
    },
}

impl CatalogError {
    /// Creates a `Request` error.
    #[must_use]
    pub fn request(url: impl Into<String>, source: SessionError) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    /// Creates an `UnexpectedStatus` error.
    #[must_use]
    pub fn unexpected_status(url: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a `MalformedResponse` error.
    #[must_use]
    pub fn malformed_response(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            source,
        }
    }
}
