//! Error types for the HTTP session.

use thiserror::Error;

/// Errors raised by [`MoxSession`](super::MoxSession) operations.
///
/// `Transport` and `Timeout` mean the request never produced a response;
/// they are kept apart from status-level failures so callers can decide
/// independently whether to retry them.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configured base URL does not parse.
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl {
        /// The rejected base URL.
        url: String,
    },

    /// The bundled public suffix list failed to parse.
    #[error("invalid public suffix list: {0}")]
    PublicSuffixList(String),

    /// The underlying reqwest client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Connection, DNS or TLS failure before a response arrived.
    #[error("network error requesting {url}: {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the configured timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The login endpoint answered with an error status.
    #[error("login rejected with HTTP {status}")]
    LoginRejected {
        /// HTTP status code returned by the login endpoint.
        status: u16,
    },
}

impl SessionError {
    /// Creates an `InvalidBaseUrl` error.
    #[must_use]
    pub fn invalid_base_url(url: impl Into<String>) -> Self {
        Self::InvalidBaseUrl { url: url.into() }
    }

    /// Maps a reqwest send failure to `Timeout` or `Transport`.
    #[must_use]
    pub fn from_send(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Transport { url, source }
        }
    }

    /// Returns true for failures where no response was received.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}
