//! Integration tests for volume downloads: per-volume retry, the worker pool,
//! and cancellation, all against a mock site.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use mox_core::download::{DownloadJob, DownloadStats};
use mox_core::session::{MoxSession, SessionSettings};
use mox_core::{
    AccessTier, AssetFormat, DownloadCoordinator, DownloadError, DownloadOptions, EngineError,
    RetryPolicy,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

mod support;
use support::{asset_response, epub_path, mount_series};

fn session(server: &MockServer) -> MoxSession {
    MoxSession::with_base_url(server.uri(), SessionSettings::default()).unwrap()
}

fn coordinator(server: &MockServer, concurrency: usize, dir: &TempDir) -> DownloadCoordinator {
    DownloadCoordinator::new(session(server), concurrency, DownloadOptions::new(dir.path()))
        .unwrap()
}

// ==================== Download Task ====================

#[tokio::test]
async fn test_task_writes_body_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down/1/10/1/2/1-0/"))
        .respond_with(asset_response(b"EPUB-BYTES"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("v.kepub.epub");
    let job = DownloadJob::new(
        "10",
        "Vol.1",
        format!("{}/down/1/10/1/2/1-0/", server.uri()),
        &destination,
    );
    let stats = DownloadStats::new();

    let done = job
        .run(&session(&server), &RetryPolicy::default(), &stats)
        .await
        .unwrap();

    assert_eq!(done.attempts, 1);
    assert_eq!(done.bytes, 10);
    assert_eq!(std::fs::read(&destination).unwrap(), b"EPUB-BYTES");
    assert_eq!(stats.retried(), 0);
}

#[tokio::test]
async fn test_task_succeeds_on_third_attempt_with_exactly_three_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down/1/11/1/2/1-0/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down/1/11/1/2/1-0/"))
        .respond_with(asset_response(b"ok"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let job = DownloadJob::new(
        "11",
        "Vol.2",
        format!("{}/down/1/11/1/2/1-0/", server.uri()),
        dir.path().join("v2.kepub.epub"),
    );
    let stats = DownloadStats::new();

    let done = job
        .run(&session(&server), &RetryPolicy::default(), &stats)
        .await
        .unwrap();

    assert_eq!(done.attempts, 3);
    assert_eq!(stats.retried(), 2);
}

#[tokio::test]
async fn test_task_abandons_after_six_attempts_and_leaves_empty_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down/1/12/1/2/1-0/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(6)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("v3.kepub.epub");
    let job = DownloadJob::new(
        "12",
        "Vol.3",
        format!("{}/down/1/12/1/2/1-0/", server.uri()),
        &destination,
    );
    let stats = DownloadStats::new();

    let err = job
        .run(&session(&server), &RetryPolicy::default(), &stats)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::RetriesExhausted {
            attempts: 6,
            last_status: 503,
            ..
        }
    ));
    assert!(err.to_string().contains("[retry=6]"), "{err}");
    assert_eq!(stats.retried(), 5);
    assert_eq!(std::fs::metadata(&destination).unwrap().len(), 0);
}

#[tokio::test]
async fn test_task_rejects_wrong_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down/1/13/1/2/1-0/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>login</html>", "text/html"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let job = DownloadJob::new(
        "13",
        "Vol.4",
        format!("{}/down/1/13/1/2/1-0/", server.uri()),
        dir.path().join("v4.kepub.epub"),
    );

    let err = job
        .run(
            &session(&server),
            &RetryPolicy::with_max_retries(1),
            &DownloadStats::new(),
        )
        .await
        .unwrap_err();

    match err {
        DownloadError::RetriesExhausted {
            attempts,
            last_status,
            last_content_type,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(last_status, 200);
            assert_eq!(last_content_type.as_deref(), Some("text/html"));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_task_file_create_failure_sends_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(asset_response(b"x"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let job = DownloadJob::new(
        "14",
        "Vol.5",
        format!("{}/down/1/14/1/2/1-0/", server.uri()),
        dir.path().join("missing-dir").join("v5.kepub.epub"),
    );

    let err = job
        .run(
            &session(&server),
            &RetryPolicy::default(),
            &DownloadStats::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::FileCreate { .. }));
}

#[tokio::test]
async fn test_task_transport_error_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("v6.kepub.epub");
    let session =
        MoxSession::with_base_url("http://127.0.0.1:9", SessionSettings::default()).unwrap();
    let job = DownloadJob::new("15", "Vol.6", "http://127.0.0.1:9/down/1/15/1/2/1-0/", &destination);
    let stats = DownloadStats::new();

    let err = job
        .run(&session, &RetryPolicy::default(), &stats)
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(stats.retried(), 0);
    assert!(!destination.exists());
}

// ==================== Coordinator ====================

#[tokio::test]
async fn test_download_all_writes_every_volume() {
    let server = MockServer::start().await;
    mount_series(
        &server,
        7,
        "Sample Series",
        &["Author A"],
        &[("101", "Vol.1"), ("102", "Vol.2"), ("103", "Vol.3")],
    )
    .await;
    for id in ["101", "102", "103"] {
        Mock::given(method("GET"))
            .and(path(epub_path(7, id)))
            .respond_with(asset_response(format!("book-{id}").as_bytes()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let report = coordinator(&server, 2, &dir)
        .download_all(7, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.title, "Sample Series");
    assert_eq!(report.volumes, 3);
    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.cancelled, 0);
    assert!(!report.interrupted);
    assert!(report.is_complete());
    for (id, name) in [("101", "Vol.1"), ("102", "Vol.2"), ("103", "Vol.3")] {
        let file = dir
            .path()
            .join(format!("[Mox][Sample Series]{name}.kepub.epub"));
        assert_eq!(std::fs::read(file).unwrap(), format!("book-{id}").as_bytes());
    }
}

#[tokio::test]
async fn test_download_all_uses_mobi_vip_paths_when_configured() {
    let server = MockServer::start().await;
    mount_series(&server, 5, "Mobi Series", &[], &[("201", "Vol.1")]).await;
    Mock::given(method("GET"))
        .and(path("/down/5/201/0/1/1-0/"))
        .respond_with(asset_response(b"mobi"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let options = DownloadOptions::new(dir.path())
        .with_format(AssetFormat::Mobi)
        .with_tier(AccessTier::Vip);
    let report = DownloadCoordinator::new(session(&server), 1, options)
        .unwrap()
        .download_all(5, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert!(dir.path().join("[Mox][Mobi Series]Vol.1.mobi").is_file());
}

#[tokio::test]
async fn test_one_abandoned_volume_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    mount_series(
        &server,
        8,
        "Mixed",
        &[],
        &[("301", "Vol.1"), ("302", "Vol.2"), ("303", "Vol.3")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(epub_path(8, "302")))
        .respond_with(ResponseTemplate::new(503))
        .expect(6)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/down/8/30[13]/1/2/1-0/$"))
        .respond_with(asset_response(b"fine"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = coordinator(&server, 3, &dir)
        .download_all(8, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 5);
    assert_eq!(report.completed + report.failed + report.cancelled, 3);
    let abandoned = dir.path().join("[Mox][Mixed]Vol.2.kepub.epub");
    assert_eq!(std::fs::metadata(abandoned).unwrap().len(), 0);
}

#[tokio::test]
async fn test_catalog_failure_is_fatal_and_downloads_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/9.htm"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/down/"))
        .respond_with(asset_response(b"x"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let result = coordinator(&server, 2, &dir)
        .download_all(9, Arc::new(AtomicBool::new(false)))
        .await;
    assert!(matches!(result, Err(EngineError::Catalog(_))));
}

#[tokio::test]
async fn test_zero_concurrency_makes_no_http_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = DownloadCoordinator::new(session(&server), 0, DownloadOptions::new("."));
    assert!(matches!(
        result,
        Err(EngineError::InvalidConcurrency { value: 0 })
    ));
}

/// Responder that tracks peak concurrent requests using atomic counters.
///
/// `Respond` is synchronous, so the overlap window is a blocking sleep on the
/// mock server's own threads.
struct ConcurrencyTrackingResponder {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl Respond for ConcurrencyTrackingResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.current.fetch_sub(1, Ordering::SeqCst);
        asset_response(b"content")
    }
}

#[tokio::test]
async fn test_worker_pool_never_exceeds_concurrency() {
    let server = MockServer::start().await;
    let volumes: Vec<(String, String)> = (0..10)
        .map(|i| (format!("{}", 400 + i), format!("Vol.{}", i + 1)))
        .collect();
    let volume_refs: Vec<(&str, &str)> = volumes
        .iter()
        .map(|(id, name)| (id.as_str(), name.as_str()))
        .collect();
    mount_series(&server, 11, "Busy", &[], &volume_refs).await;

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path_regex("^/down/11/"))
        .respond_with(ConcurrencyTrackingResponder {
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
            delay: Duration::from_millis(100),
        })
        .expect(10)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = coordinator(&server, 3, &dir)
        .download_all(11, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.completed, 10);
    assert!(report.peak_running <= 3, "peak_running = {}", report.peak_running);
    let observed = peak.load(Ordering::SeqCst);
    assert!(observed <= 3, "server saw {observed} concurrent requests");
}

/// Serves the asset and raises the interrupt flag, as a Ctrl-C mid-batch would.
struct InterruptingResponder {
    interrupted: Arc<AtomicBool>,
}

impl Respond for InterruptingResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        self.interrupted.store(true, Ordering::SeqCst);
        asset_response(b"first")
    }
}

#[tokio::test]
async fn test_interrupt_lets_running_job_finish_and_cancels_the_rest() {
    let server = MockServer::start().await;
    mount_series(
        &server,
        12,
        "Stopped",
        &[],
        &[
            ("501", "Vol.1"),
            ("502", "Vol.2"),
            ("503", "Vol.3"),
            ("504", "Vol.4"),
            ("505", "Vol.5"),
        ],
    )
    .await;

    let interrupted = Arc::new(AtomicBool::new(false));
    Mock::given(method("GET"))
        .and(path_regex("^/down/12/"))
        .respond_with(InterruptingResponder {
            interrupted: Arc::clone(&interrupted),
        })
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = coordinator(&server, 1, &dir)
        .download_all(12, Arc::clone(&interrupted))
        .await
        .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.cancelled, 4);
    assert!(dir.path().join("[Mox][Stopped]Vol.1.kepub.epub").is_file());
    assert!(!dir.path().join("[Mox][Stopped]Vol.2.kepub.epub").exists());
}

/// Like [`InterruptingResponder`], but holds the response back so the
/// interrupt lands while the submitter is blocked on a full queue.
struct SlowInterruptingResponder {
    interrupted: Arc<AtomicBool>,
}

impl Respond for SlowInterruptingResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        self.interrupted.store(true, Ordering::SeqCst);
        asset_response(b"first").set_delay(Duration::from_millis(300))
    }
}

#[tokio::test]
async fn test_interrupt_with_full_queue_accounts_every_volume() {
    let server = MockServer::start().await;
    let volumes = [
        ("511", "Vol.1"),
        ("512", "Vol.2"),
        ("513", "Vol.3"),
        ("514", "Vol.4"),
        ("515", "Vol.5"),
        ("516", "Vol.6"),
    ];
    mount_series(&server, 15, "Backlog", &[], &volumes).await;

    let interrupted = Arc::new(AtomicBool::new(false));
    Mock::given(method("GET"))
        .and(path_regex("^/down/15/"))
        .respond_with(SlowInterruptingResponder {
            interrupted: Arc::clone(&interrupted),
        })
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let options = DownloadOptions::new(dir.path()).with_queue_capacity(1);
    let coordinator = DownloadCoordinator::new(session(&server), 1, options).unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        coordinator.download_all(15, Arc::clone(&interrupted)),
    )
    .await
    .expect("coordinator deadlocked with a full queue")
    .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.volumes, 6);
    assert_eq!(report.completed + report.failed + report.cancelled, 6);
    assert_eq!(report.completed, 1);
    assert_eq!(report.cancelled, 5);
    assert!(dir.path().join("[Mox][Backlog]Vol.1.kepub.epub").is_file());
}

#[tokio::test]
async fn test_observed_stats_match_report() {
    let server = MockServer::start().await;
    mount_series(&server, 13, "Watched", &[], &[("601", "Vol.1"), ("602", "Vol.2")]).await;
    Mock::given(method("GET"))
        .and(path_regex("^/down/13/"))
        .respond_with(asset_response(b"v"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let stats = Arc::new(DownloadStats::new());
    let report = coordinator(&server, 2, &dir)
        .download_all_with_stats(13, Arc::new(AtomicBool::new(false)), Arc::clone(&stats))
        .await
        .unwrap();

    assert_eq!(stats.completed(), report.completed);
    assert_eq!(stats.total(), 2);
    assert_eq!(stats.running(), 0);
}
