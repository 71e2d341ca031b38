//! TOML configuration for the `mox` tool.
//!
//! ```toml
//! [mox]
//! email = "reader@example.com"
//! password = "secret"
//! download_path = "/home/reader/books"
//! transfers = 4
//! # optional
//! format = "epub"            # or "mobi"
//! tier = "vip2"              # or "vip"
//! connect_timeout_secs = 30
//! request_timeout_secs = 600
//! queue_capacity = 1024
//! base_url = "https://mox.moe"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::catalog::{AccessTier, AssetFormat};
use crate::download::{DEFAULT_QUEUE_CAPACITY, DownloadOptions};
use crate::session::{DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, SessionSettings};

/// Accepted range for timeout values, in seconds.
const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=86_400;

/// Errors raised while loading or preparing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected layout.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {message}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The download directory could not be created.
    #[error("cannot create download directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The `[mox]` table.
    pub mox: MoxConfig,
}

/// The `[mox]` table.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoxConfig {
    /// Account e-mail.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Directory volumes are written into.
    pub download_path: PathBuf,
    /// Number of concurrent downloads.
    pub transfers: usize,
    /// Asset format; epub when absent.
    #[serde(default)]
    pub format: Option<AssetFormat>,
    /// Access tier; vip2 when absent.
    #[serde(default)]
    pub tier: Option<AccessTier>,
    /// TCP connect timeout in seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds; unbounded when absent.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Job queue capacity.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Site origin.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for MoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoxConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("download_path", &self.download_path)
            .field("transfers", &self.transfers)
            .field("format", &self.format)
            .field("tier", &self.tier)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("queue_capacity", &self.queue_capacity)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`], [`ConfigError::Parse`] or
    /// [`ConfigError::Invalid`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), config = ?config.mox, "config loaded");
        Ok(config)
    }

    /// Parses TOML text without validating it.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text does not match the layout.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mox = &self.mox;
        if mox.email.trim().is_empty() {
            return Err(ConfigError::invalid("email", "must not be empty"));
        }
        if mox.download_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("download_path", "must not be empty"));
        }
        if mox.transfers == 0 {
            return Err(ConfigError::invalid("transfers", "must be at least 1"));
        }
        if mox.queue_capacity == Some(0) {
            return Err(ConfigError::invalid("queue_capacity", "must be at least 1"));
        }
        validate_timeout("connect_timeout_secs", mox.connect_timeout_secs)?;
        validate_timeout("request_timeout_secs", mox.request_timeout_secs)?;
        if let Some(base_url) = &mox.base_url
            && Url::parse(base_url).is_err()
        {
            return Err(ConfigError::invalid(
                "base_url",
                format!("'{base_url}' is not a valid URL"),
            ));
        }
        Ok(())
    }

    /// Creates the download directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CreateDir`] if the directory cannot be created.
    pub fn init(&self) -> Result<(), ConfigError> {
        let path = &self.mox.download_path;
        if !path.is_dir() {
            std::fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
                path: path.clone(),
                source,
            })?;
            info!(dir = %path.display(), "created download directory");
        }
        Ok(())
    }

    /// Applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `transfers` is 0.
    pub fn with_overrides(
        mut self,
        transfers: Option<usize>,
        format: Option<AssetFormat>,
        tier: Option<AccessTier>,
    ) -> Result<Self, ConfigError> {
        if let Some(transfers) = transfers {
            if transfers == 0 {
                return Err(ConfigError::invalid("transfers", "must be at least 1"));
            }
            self.mox.transfers = transfers;
        }
        if format.is_some() {
            self.mox.format = format;
        }
        if tier.is_some() {
            self.mox.tier = tier;
        }
        Ok(self)
    }

    /// Site origin to talk to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.mox.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// HTTP settings for the session.
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_secs(
                self.mox
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            request_timeout: self.mox.request_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Download options for the coordinator.
    #[must_use]
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions::new(&self.mox.download_path)
            .with_format(self.mox.format.unwrap_or_default())
            .with_tier(self.mox.tier.unwrap_or_default())
            .with_queue_capacity(self.mox.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY))
    }
}

fn validate_timeout(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !TIMEOUT_RANGE_SECS.contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!(
                "{value}. Expected range: {}..={}",
                TIMEOUT_RANGE_SECS.start(),
                TIMEOUT_RANGE_SECS.end()
            ),
        ));
    }
    Ok(())
}
