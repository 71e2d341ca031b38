//! Concurrent volume downloads with bounded immediate retry.
//!
//! A [`DownloadCoordinator`] scrapes one series and hands a [`DownloadJob`]
//! per volume to a fixed pool of workers. Each job streams the asset to
//! `[{site}][{title}]{volume}.{ext}` inside the output directory.
//!
//! # Features
//!
//! - Bounded job queue shared by `concurrency` workers
//! - Up to 6 attempts per volume when the server answers with a bad status
//!   or content type
//! - Transport errors fail the volume without retry
//! - Cooperative cancellation through a shared interrupt flag

mod constants;
mod engine;
mod error;
mod filename;
mod retry;
mod task;

pub use constants::{DEFAULT_QUEUE_CAPACITY, MAX_RETRIES, OCTET_STREAM};
pub use engine::{
    DownloadCoordinator, DownloadOptions, DownloadReport, DownloadStats, EngineError,
};
pub use error::DownloadError;
pub use filename::{sanitize_filename, volume_destination, volume_filename};
pub use retry::{RetryDecision, RetryPolicy};
pub use task::{DownloadJob, DownloadedVolume};
