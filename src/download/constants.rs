//! Constants for the download module (retry budget, queue sizing, validation).

use std::time::Duration;

/// Retries allowed after the first failed attempt (6 attempts in total).
pub const MAX_RETRIES: u32 = 5;

/// Default number of jobs buffered ahead of the workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Content type an asset response must carry to be accepted.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How often a blocked worker or submitter re-checks the interrupt flag.
pub(crate) const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
