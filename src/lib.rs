//! mox core library.
//!
//! Downloads every volume of a manga series from mox.moe: sign in, scrape the
//! series catalog into an ordered volume list, then fetch each volume's
//! e-book asset with a bounded pool of workers.
//!
//! # Architecture
//!
//! - [`session`] - cookie-persisting HTTP session, login and logout
//! - [`catalog`] - series page and metadata scraping, download path layout
//! - [`download`] - worker pool, per-volume retry, file output
//! - [`config`] - TOML configuration file

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod session;
mod user_agent;

// Re-export commonly used types
pub use catalog::{AccessTier, AssetFormat, CatalogError, CatalogScraper, SeriesInfo, VolumeRef};
pub use config::{Config, ConfigError};
pub use download::{
    DownloadCoordinator, DownloadError, DownloadOptions, DownloadReport, DownloadStats,
    EngineError, RetryPolicy,
};
pub use session::{MoxSession, SessionError, SessionSettings};
