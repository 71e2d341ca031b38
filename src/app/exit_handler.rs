//! Exit code logic for the mox process.
//!
//! Single responsibility: map a finished batch to the process exit outcome.

use mox_core::DownloadReport;

use crate::ProcessExit;

/// Failed volumes are logged as warnings and do not fail the process; only an
/// interrupt does.
pub(crate) fn exit_outcome_for_report(report: &DownloadReport) -> ProcessExit {
    if report.interrupted {
        ProcessExit::Failure
    } else {
        ProcessExit::Success
    }
}
