//! Cookie-persisting HTTP session bound to one site origin.
//!
//! Every request made through a [`MoxSession`] shares one cookie jar, so the
//! cookies set by [`MoxSession::login`] authorize later catalog and asset
//! requests. The session is cheap to clone; clones share the jar and the
//! connection pool, which makes it safe to hand one copy to every download
//! worker.

mod cookie_jar;
mod error;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::{debug, info, instrument};
use url::Url;

use crate::user_agent;
use cookie_jar::PublicSuffixJar;

pub use error::SessionError;

/// Production origin of the content site.
pub const DEFAULT_BASE_URL: &str = "https://mox.moe";

/// Default TCP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "login_do.php";
const LOGOUT_PATH: &str = "logout.php";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Transport settings for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout; `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
        }
    }
}

/// HTTP session with a persistent, public-suffix-aware cookie jar.
#[derive(Debug, Clone)]
pub struct MoxSession {
    client: Client,
    cookie_jar: Arc<PublicSuffixJar>,
    base_url: String,
}

impl MoxSession {
    /// Creates a session against [`DEFAULT_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Build`] if the HTTP client cannot be built.
    pub fn new(settings: SessionSettings) -> Result<Self, SessionError> {
        Self::with_base_url(DEFAULT_BASE_URL, settings)
    }

    /// Creates a session against a custom origin (mock servers in tests).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidBaseUrl`] if `base_url` does not parse,
    /// [`SessionError::PublicSuffixList`] if the bundled suffix list is
    /// unreadable and [`SessionError::Build`] if the HTTP client cannot be built.
    #[instrument(level = "debug", skip_all)]
    pub fn with_base_url(
        base_url: impl Into<String>,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| SessionError::invalid_base_url(&base_url))?;

        let cookie_jar = Arc::new(PublicSuffixJar::new()?);
        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .gzip(true)
            .user_agent(user_agent::default_session_user_agent())
            .cookie_provider(Arc::clone(&cookie_jar));
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(SessionError::Build)?;

        debug!(base_url = %base_url, ?settings, "session created");
        Ok(Self {
            client,
            cookie_jar,
            base_url,
        })
    }

    /// Returns the origin this session is bound to, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins a site-relative path onto the base URL.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Returns the `Cookie` header the jar would send to the base origin.
    #[cfg(test)]
    fn cookie_header(&self) -> Option<String> {
        let url = Url::parse(&self.base_url).ok()?;
        self.cookie_jar.header_value(&url)
    }

    /// Sends a GET request. Any HTTP status is returned as a response.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] or [`SessionError::Timeout`] when
    /// no response is received.
    pub async fn get(&self, url: &str) -> Result<Response, SessionError> {
        debug!(url, "GET");
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| SessionError::from_send(url, e))
    }

    /// Sends a url-encoded form POST.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] or [`SessionError::Timeout`] when
    /// no response is received.
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
    ) -> Result<Response, SessionError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        debug!(url, fields = fields.len(), "POST form");
        self.client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| SessionError::from_send(url, e))
    }

    /// Signs in; the session cookies land in the shared jar.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LoginRejected`] for 4xx/5xx answers and the
    /// transport errors of [`Self::post_form`].
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let url = self.url_for(LOGIN_PATH);
        let response = self
            .post_form(&url, &[("email", email), ("passwd", password)])
            .await?;
        let status = response.status();
        // Body is read only to release the connection.
        let _ = response.bytes().await;

        if status.is_client_error() || status.is_server_error() {
            return Err(SessionError::LoginRejected {
                status: status.as_u16(),
            });
        }
        info!("signed in");
        Ok(())
    }

    /// Signs out of the site.
    ///
    /// # Errors
    ///
    /// Returns the transport errors of [`Self::get`].
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), SessionError> {
        let response = self.get(&self.url_for(LOGOUT_PATH)).await?;
        let _ = response.bytes().await;
        info!("signed out");
        Ok(())
    }
}
