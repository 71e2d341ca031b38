//! Bounded worker pool that downloads every volume of a series.
//!
//! The coordinator scrapes the series, then feeds one [`DownloadJob`] per
//! volume into a bounded channel. `concurrency` workers share the receiving
//! end; each pulls one job at a time and runs it to completion. Once every
//! job is submitted the sender is dropped, which closes the queue, and the
//! coordinator waits for all workers to exit before reporting.
//!
//! Cancellation is cooperative. Setting the interrupt flag stops submission,
//! stops workers from taking new jobs, and lets jobs already running finish.
//! Jobs that never start are reported as cancelled, so
//! `completed + failed + cancelled` always equals the number of volumes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use mox_core::download::{DownloadCoordinator, DownloadOptions};
//! use mox_core::session::{MoxSession, SessionSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = MoxSession::new(SessionSettings::default())?;
//! session.login("reader@example.com", "secret").await?;
//! let coordinator = DownloadCoordinator::new(session, 4, DownloadOptions::new("./library"))?;
//! let report = coordinator.download_all(1234, Arc::new(AtomicBool::new(false))).await?;
//! println!("Completed: {}, Failed: {}", report.completed, report.failed);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_QUEUE_CAPACITY, INTERRUPT_POLL_INTERVAL};
use super::error::DownloadError;
use super::filename::volume_destination;
use super::retry::RetryPolicy;
use super::task::DownloadJob;
use crate::catalog::{AccessTier, AssetFormat, CatalogError, CatalogScraper, SITE_TAG, SeriesInfo};
use crate::session::MoxSession;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

type JobQueue = Arc<Mutex<mpsc::Receiver<DownloadJob>>>;

/// Error type for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error("invalid concurrency value {value}: must be at least {MIN_CONCURRENCY}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Invalid queue capacity provided.
    #[error("invalid queue capacity {value}: must be at least 1")]
    InvalidQueueCapacity {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Scraping failed before any download started.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Live counters for one batch.
///
/// Shared between the coordinator, its workers and any observer (such as a
/// progress spinner). Use a fresh instance per batch.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    retried: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    interrupted: AtomicBool,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successfully completed downloads.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of failed downloads.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of volumes that were never started.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the number of volumes accounted for so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed() + self.cancelled()
    }

    /// Returns the number of retries made across all jobs.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns the number of jobs currently running.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the highest number of jobs seen running at once.
    #[must_use]
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Returns true if the batch stopped because of an interrupt.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn add_cancelled(&self, count: usize) {
        self.cancelled.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn start_job(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);
    }

    fn finish_job(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

/// Outcome of one [`DownloadCoordinator::download_all`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Series identifier.
    pub series_id: u64,
    /// Series title as scraped.
    pub title: String,
    /// Number of volumes in the series.
    pub volumes: usize,
    /// Volumes written successfully.
    pub completed: usize,
    /// Volumes abandoned or failed.
    pub failed: usize,
    /// Volumes never started because of an interrupt.
    pub cancelled: usize,
    /// Retries made across all volumes.
    pub retried: usize,
    /// Highest number of downloads running at once.
    pub peak_running: usize,
    /// True if the batch was interrupted.
    pub interrupted: bool,
}

impl DownloadReport {
    fn from_stats(series: &SeriesInfo, stats: &DownloadStats) -> Self {
        Self {
            series_id: series.id(),
            title: series.title().to_string(),
            volumes: series.volumes().len(),
            completed: stats.completed(),
            failed: stats.failed(),
            cancelled: stats.cancelled(),
            retried: stats.retried(),
            peak_running: stats.peak_running(),
            interrupted: stats.was_interrupted(),
        }
    }

    /// True when every volume was written and nothing was interrupted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.completed == self.volumes
    }
}

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Directory the volumes are written into. Must exist.
    pub output_dir: PathBuf,
    /// Asset format to request.
    pub format: AssetFormat,
    /// Access tier to request.
    pub tier: AccessTier,
    /// Capacity of the job queue.
    pub queue_capacity: usize,
    /// Per-job retry budget.
    pub retry_policy: RetryPolicy,
    /// Tag placed in front of every filename.
    pub site_tag: String,
}

impl DownloadOptions {
    /// Options with the default format, tier, queue and retry budget.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: AssetFormat::default(),
            tier: AccessTier::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_policy: RetryPolicy::default(),
            site_tag: SITE_TAG.to_string(),
        }
    }

    /// Sets the asset format.
    #[must_use]
    pub fn with_format(mut self, format: AssetFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the access tier.
    #[must_use]
    pub fn with_tier(mut self, tier: AccessTier) -> Self {
        self.tier = tier;
        self
    }

    /// Sets the job queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

/// Scrapes a series and downloads its volumes with a fixed worker pool.
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    session: MoxSession,
    scraper: CatalogScraper,
    concurrency: usize,
    options: DownloadOptions,
}

impl DownloadCoordinator {
    /// Creates a coordinator running `concurrency` workers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is 0 and
    /// [`EngineError::InvalidQueueCapacity`] if the queue capacity is 0.
    pub fn new(
        session: MoxSession,
        concurrency: usize,
        options: DownloadOptions,
    ) -> Result<Self, EngineError> {
        if concurrency < MIN_CONCURRENCY {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        if options.queue_capacity == 0 {
            return Err(EngineError::InvalidQueueCapacity {
                value: options.queue_capacity,
            });
        }

        debug!(concurrency, ?options, "creating download coordinator");
        Ok(Self {
            scraper: CatalogScraper::new(session.clone()),
            session,
            concurrency,
            options,
        })
    }

    /// Returns the number of workers.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the download options.
    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Scrapes `series_id` and downloads every volume.
    ///
    /// Individual volume failures do not error; they are logged and counted
    /// in the report.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Catalog`] if scraping fails. No volume request
    /// is made in that case.
    pub async fn download_all(
        &self,
        series_id: u64,
        interrupted: Arc<AtomicBool>,
    ) -> Result<DownloadReport, EngineError> {
        self.download_all_with_stats(series_id, interrupted, Arc::new(DownloadStats::new()))
            .await
    }

    /// Like [`Self::download_all`], updating caller-owned `stats` as it goes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Catalog`] if scraping fails.
    pub async fn download_all_with_stats(
        &self,
        series_id: u64,
        interrupted: Arc<AtomicBool>,
        stats: Arc<DownloadStats>,
    ) -> Result<DownloadReport, EngineError> {
        let series = self.scraper.fetch_series(series_id).await?;
        Ok(self.download_series(&series, interrupted, stats).await)
    }

    /// Downloads the volumes of an already scraped series.
    #[instrument(
        skip(self, series, interrupted, stats),
        fields(series_id = series.id(), volumes = series.volumes().len())
    )]
    pub async fn download_series(
        &self,
        series: &SeriesInfo,
        interrupted: Arc<AtomicBool>,
        stats: Arc<DownloadStats>,
    ) -> DownloadReport {
        let jobs = self.jobs_for(series);
        let (sender, receiver) = mpsc::channel(self.options.queue_capacity);
        let queue: JobQueue = Arc::new(Mutex::new(receiver));

        info!(
            title = %series.title(),
            workers = self.concurrency,
            format = %self.options.format,
            tier = %self.options.tier,
            "starting downloads"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&queue),
                self.session.clone(),
                self.options.retry_policy,
                Arc::clone(&stats),
                Arc::clone(&interrupted),
            ));
        }

        let submitted = submit_jobs(sender, jobs, &interrupted, &stats).await;
        debug!(submitted, "all jobs submitted, waiting for workers");

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "download worker panicked");
            }
        }

        // Jobs still queued were never picked up.
        let unstarted = drain_queue(&queue).await;
        if unstarted > 0 {
            stats.add_cancelled(unstarted);
        }
        if interrupted.load(Ordering::SeqCst) {
            stats.mark_interrupted();
        }

        let report = DownloadReport::from_stats(series, &stats);
        info!(
            completed = report.completed,
            failed = report.failed,
            cancelled = report.cancelled,
            retried = report.retried,
            interrupted = report.interrupted,
            "downloads finished"
        );
        report
    }

    fn jobs_for(&self, series: &SeriesInfo) -> Vec<DownloadJob> {
        series
            .volumes()
            .iter()
            .map(|volume| {
                let url = self
                    .session
                    .url_for(&volume.asset_path(self.options.format, self.options.tier));
                let destination = volume_destination(
                    &self.options.output_dir,
                    &self.options.site_tag,
                    series.title(),
                    volume.name(),
                    self.options.format,
                );
                DownloadJob::new(volume.id(), volume.name(), url, destination)
            })
            .collect()
    }
}

/// Pushes jobs into the queue until done or interrupted.
///
/// Jobs never handed to the queue are counted as cancelled. Dropping the
/// sender on return closes the queue.
async fn submit_jobs(
    sender: mpsc::Sender<DownloadJob>,
    jobs: Vec<DownloadJob>,
    interrupted: &AtomicBool,
    stats: &DownloadStats,
) -> usize {
    let total = jobs.len();
    let mut submitted = 0;

    for job in jobs {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let sent = tokio::select! {
            biased;
            () = wait_for_interrupt(interrupted) => false,
            result = sender.send(job) => result.is_ok(),
        };
        if !sent {
            break;
        }
        submitted += 1;
    }

    let skipped = total - submitted;
    if skipped > 0 {
        info!(skipped, "interrupted, remaining volumes not queued");
        stats.add_cancelled(skipped);
    }
    submitted
}

async fn run_worker(
    worker_id: usize,
    queue: JobQueue,
    session: MoxSession,
    policy: RetryPolicy,
    stats: Arc<DownloadStats>,
    interrupted: Arc<AtomicBool>,
) {
    debug!(worker_id, "worker started");

    loop {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }

        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                () = wait_for_interrupt(&interrupted) => None,
                job = queue.recv() => job,
            }
        };
        let Some(job) = next else {
            break;
        };

        if interrupted.load(Ordering::SeqCst) {
            stats.add_cancelled(1);
            break;
        }

        stats.start_job();
        let volume = format!("{} ({})", job.volume_name(), job.volume_id());
        let handle = {
            let session = session.clone();
            let stats = Arc::clone(&stats);
            tokio::spawn(async move { job.run(&session, &policy, &stats).await })
        };

        match handle.await {
            Ok(Ok(done)) => {
                info!(
                    worker_id,
                    volume = %volume,
                    path = %done.path.display(),
                    bytes = done.bytes,
                    attempts = done.attempts,
                    "volume downloaded"
                );
                stats.increment_completed();
            }
            Ok(Err(e @ DownloadError::RetriesExhausted { .. })) => {
                warn!(worker_id, volume = %volume, error = %e, "volume skipped");
                stats.increment_failed();
            }
            Ok(Err(e)) => {
                warn!(worker_id, volume = %volume, error = %e, "volume failed");
                stats.increment_failed();
            }
            Err(e) => {
                warn!(worker_id, volume = %volume, error = %e, "download task panicked");
                stats.increment_failed();
            }
        }
        stats.finish_job();
    }

    debug!(worker_id, "worker stopped");
}

async fn drain_queue(queue: &Mutex<mpsc::Receiver<DownloadJob>>) -> usize {
    let mut queue = queue.lock().await;
    let mut count = 0;
    while queue.try_recv().is_ok() {
        count += 1;
    }
    count
}

/// Resolves once `interrupted` is set.
async fn wait_for_interrupt(interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(INTERRUPT_POLL_INTERVAL).await;
    }
}
