//! Integration tests for the download orchestration engine.
//!
//! These tests drive a real `DownloadEngine` with its scheduler loop
//! against a mock HTTP server, covering the job lifecycle, duplicate
//! policy, aggregate rollup, cooperative pause/cancel, and the admission
//! gate's concurrency bound.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mediagrab_core::{
    DirectResolver, DownloadEngine, DuplicatePolicy, GroupType, JobId, JobStatus, MediaRef,
    MediaResolver, ResolveError, ResolvedContent, ResolverRegistry, Settings,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ==================== Helper Functions ====================

/// A resolver that stalls before handing out its URL, so tests get a
/// predictable window while the job is Downloading but no bytes have moved.
struct SlowResolver {
    url: String,
    delay: Duration,
}

#[async_trait]
impl MediaResolver for SlowResolver {
    fn source(&self) -> &str {
        "slow"
    }

    async fn resolve(&self, _media: &MediaRef) -> Result<Option<ResolvedContent>, ResolveError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(ResolvedContent {
            url: self.url.clone(),
        }))
    }
}

fn engine_with(settings: Settings) -> DownloadEngine {
    let mut resolvers = ResolverRegistry::new();
    resolvers.register(Box::new(DirectResolver::new()));
    DownloadEngine::new(settings, resolvers)
}

/// Settings with a predictable destination template (`<title>.<ext>`).
fn flat_settings() -> Settings {
    Settings {
        concurrency: 1,
        file_template: "{safeTitle}.{ext}".to_string(),
        pool_file_template: "{pool_name}/{page_number}_{safeTitle}.{ext}".to_string(),
        ..Settings::default()
    }
}

fn direct_media(url: &str, title: &str, ext: &str) -> MediaRef {
    MediaRef {
        source: "direct".to_string(),
        item_id: url.to_string(),
        title: title.to_string(),
        artist: "artist".to_string(),
        extension: Some(ext.to_string()),
    }
}

/// Polls `condition` until it holds or the deadline passes.
async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_status(engine: &DownloadEngine, id: JobId, status: JobStatus) -> bool {
    wait_for(Duration::from_secs(10), || {
        engine.get_job(id).map(|job| job.status) == Some(status)
    })
    .await
}

fn spawn_scheduler(engine: &DownloadEngine) -> tokio::task::JoinHandle<()> {
    let runner = engine.clone();
    tokio::spawn(async move { runner.run_scheduler().await })
}

async fn stop_scheduler(engine: &DownloadEngine, handle: tokio::task::JoinHandle<()>) {
    engine.shutdown();
    let _ = handle.await;
}

// ==================== Single Job Tests ====================

#[tokio::test]
async fn test_single_job_downloads_to_completion() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1000]))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let url = format!("{}/file.png", mock_server.uri());
    let id = engine.enqueue(direct_media(&url, "file", "png"), out.path());

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, id, JobStatus::Completed).await);
    stop_scheduler(&engine, scheduler).await;

    let job = engine.get_job(id).unwrap();
    assert_eq!(job.bytes_downloaded, 1000);
    assert_eq!(job.total_bytes, 1000);
    assert!(job.completed_at.is_some());
    assert!(job.started_at.is_some());
    assert!(job.error_message.is_none());
    assert_eq!(job.destination_path, out.path().join("file.png"));
    assert_eq!(std::fs::read(&job.destination_path).unwrap().len(), 1000);
}

#[tokio::test]
async fn test_http_error_marks_job_failed_with_message() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let url = format!("{}/gone.png", mock_server.uri());
    let id = engine.enqueue(direct_media(&url, "gone", "png"), out.path());

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, id, JobStatus::Failed).await);
    stop_scheduler(&engine, scheduler).await;

    let job = engine.get_job(id).unwrap();
    let message = job.error_message.unwrap();
    assert!(message.contains("404"), "expected status in: {message}");
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn test_resolution_failure_marks_job_failed() {
    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    // DirectResolver yields nothing for a blank item id.
    let media = MediaRef {
        source: "direct".to_string(),
        item_id: "   ".to_string(),
        title: "empty".to_string(),
        artist: String::new(),
        extension: Some("png".to_string()),
    };
    let id = engine.enqueue(media, out.path());

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, id, JobStatus::Failed).await);
    stop_scheduler(&engine, scheduler).await;

    let message = engine.get_job(id).unwrap().error_message.unwrap();
    assert!(
        message.contains("resolution failed"),
        "expected resolution error in: {message}"
    );
}

#[tokio::test]
async fn test_unknown_extension_rewritten_from_resolved_url() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let url = format!("{}/item.webm", mock_server.uri());
    let mut media = direct_media(&url, "item", "png");
    // Extension unknown at enqueue time: the placeholder is used first.
    media.extension = None;
    let id = engine.enqueue(media, out.path());
    assert_eq!(
        engine.get_job(id).unwrap().destination_path,
        out.path().join("item.bin")
    );

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, id, JobStatus::Completed).await);
    stop_scheduler(&engine, scheduler).await;

    // Only the extension portion was rewritten; directory and stem stayed.
    let job = engine.get_job(id).unwrap();
    assert_eq!(job.destination_path, out.path().join("item.webm"));
    assert!(job.destination_path.exists());
}

// ==================== Duplicate Policy Tests ====================

#[tokio::test]
async fn test_duplicate_skip_completes_instantly_without_network() {
    let mock_server = MockServer::start().await;
    // The strict expectation fails the test on drop if any request lands.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    std::fs::write(out.path().join("file.png"), b"already here").unwrap();

    let settings = Settings {
        duplicate_policy: DuplicatePolicy::Skip,
        ..flat_settings()
    };
    let engine = engine_with(settings);
    let url = format!("{}/file.png", mock_server.uri());
    let id = engine.enqueue(direct_media(&url, "file", "png"), out.path());

    // Completed before any scheduler tick ever runs.
    let job = engine.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(job.bytes_downloaded, 0);

    // Let the scheduler scan a couple of times; the completed job must
    // never be picked up again.
    let scheduler = spawn_scheduler(&engine);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    stop_scheduler(&engine, scheduler).await;
}

#[tokio::test]
async fn test_cancelled_queued_job_is_never_fetched() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let url = format!("{}/file.png", mock_server.uri());
    let id = engine.enqueue(direct_media(&url, "file", "png"), out.path());

    assert!(engine.cancel(id));

    let scheduler = spawn_scheduler(&engine);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    stop_scheduler(&engine, scheduler).await;

    assert_eq!(engine.get_job(id).unwrap().status, JobStatus::Cancelled);
}

// ==================== Retry Tests ====================

#[tokio::test]
async fn test_retry_resets_failed_job_for_full_restart() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let url = format!("{}/flaky.png", mock_server.uri());
    let id = engine.enqueue(direct_media(&url, "flaky", "png"), out.path());

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, id, JobStatus::Failed).await);
    stop_scheduler(&engine, scheduler).await;

    assert!(engine.retry(id));
    let job = engine.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retry_count, 1);
    assert!(job.error_message.is_none());
    assert_eq!(job.bytes_downloaded, 0);

    // Only Failed jobs are retryable.
    assert!(!engine.retry(id));
}

// ==================== Pause / Resume Tests ====================

#[tokio::test]
async fn test_pause_then_resume_restarts_from_byte_zero() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 2048]))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let mut resolvers = ResolverRegistry::new();
    resolvers.register(Box::new(SlowResolver {
        url: format!("{}/big.png", mock_server.uri()),
        delay: Duration::from_millis(600),
    }));
    let engine = DownloadEngine::new(flat_settings(), resolvers);

    let media = MediaRef {
        source: "slow".to_string(),
        item_id: "big".to_string(),
        title: "big".to_string(),
        artist: String::new(),
        extension: Some("png".to_string()),
    };
    let id = engine.enqueue(media, out.path());

    let scheduler = spawn_scheduler(&engine);

    // The job sits in Downloading for the resolver's full delay; pause
    // lands well inside that window and is observed at the first chunk
    // boundary.
    assert!(wait_for_status(&engine, id, JobStatus::Downloading).await);
    assert!(engine.pause(id));
    assert_eq!(engine.get_job(id).unwrap().status, JobStatus::Paused);

    // Pausing a paused job is a no-op.
    assert!(!engine.pause(id));

    // Resume re-queues; the next execution recreates the file from byte 0.
    assert!(engine.resume(id));
    assert!(wait_for_status(&engine, id, JobStatus::Completed).await);
    stop_scheduler(&engine, scheduler).await;

    let job = engine.get_job(id).unwrap();
    assert_eq!(job.bytes_downloaded, 2048);
    assert_eq!(job.total_bytes, 2048);
    assert_eq!(std::fs::read(&job.destination_path).unwrap().len(), 2048);
}

/// Serves one HTTP response whose body has no length framing, so the stream
/// only ends when the connection closes. The connection stays open until
/// `close` is signalled, parking the reader on the final body read.
async fn serve_until_closed(body: Vec<u8>, close: Arc<Notify>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\n")
            .await;
        let _ = socket.write_all(&body).await;
        let _ = socket.flush().await;
        close.notified().await;
        // Dropping the socket ends the body.
    });
    format!("http://{addr}/held.png")
}

#[tokio::test]
async fn test_cancel_during_final_read_is_not_overwritten() {
    let close = Arc::new(Notify::new());
    let url = serve_until_closed(vec![5u8; 1000], Arc::clone(&close)).await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let id = engine.enqueue(direct_media(&url, "held", "png"), out.path());

    let scheduler = spawn_scheduler(&engine);

    // All bytes arrive but the server holds the connection open, so the
    // executor sits in the stream read waiting for end-of-body.
    assert!(
        wait_for(Duration::from_secs(10), || {
            engine
                .get_job(id)
                .is_some_and(|job| job.bytes_downloaded == 1000)
        })
        .await
    );
    assert!(engine.cancel(id));

    // The stream now ends cleanly; the finished transfer must not overwrite
    // the terminal status set while it was draining.
    close.notify_one();
    tokio::time::sleep(Duration::from_millis(500)).await;
    stop_scheduler(&engine, scheduler).await;

    let job = engine.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_none());
}

// ==================== Aggregate Tests ====================

#[tokio::test]
async fn test_aggregate_all_children_complete_rolls_up_completed() {
    let mock_server = MockServer::start().await;
    for (page, size) in [("1", 100usize), ("2", 250), ("3", 400)] {
        Mock::given(method("GET"))
            .and(path(format!("/{page}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; size]))
            .mount(&mock_server)
            .await;
    }

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let items: Vec<MediaRef> = ["1", "2", "3"]
        .into_iter()
        .map(|page| {
            direct_media(
                &format!("{}/{page}.png", mock_server.uri()),
                page,
                "png",
            )
        })
        .collect();
    let aggregate_id =
        engine.enqueue_aggregate(GroupType::Pool, items, out.path(), "My Pool");

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, aggregate_id, JobStatus::Completed).await);
    stop_scheduler(&engine, scheduler).await;

    let aggregate = engine.get_job(aggregate_id).unwrap();
    assert_eq!(aggregate.total_bytes, 750);
    assert_eq!(aggregate.bytes_downloaded, 750);
    assert!(aggregate.completed_at.is_some());

    // Counters are exactly the sum over current children.
    let child_total: u64 = aggregate
        .children_ids
        .iter()
        .map(|id| engine.get_job(*id).unwrap().bytes_downloaded)
        .sum();
    assert_eq!(child_total, aggregate.bytes_downloaded);

    // Pool members land in the group directory with page prefixes.
    let first_child = engine.get_job(aggregate.children_ids[0]).unwrap();
    assert_eq!(
        first_child.destination_path,
        out.path().join("My_Pool").join("1_1.png")
    );
}

#[tokio::test]
async fn test_aggregate_failed_child_rolls_up_failed() {
    let mock_server = MockServer::start().await;
    for page in ["1", "3"] {
        Mock::given(method("GET"))
            .and(path(format!("/{page}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 50]))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/2.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let items: Vec<MediaRef> = ["1", "2", "3"]
        .into_iter()
        .map(|page| {
            direct_media(
                &format!("{}/{page}.png", mock_server.uri()),
                page,
                "png",
            )
        })
        .collect();
    let aggregate_id =
        engine.enqueue_aggregate(GroupType::Pool, items, out.path(), "broken pool");

    let scheduler = spawn_scheduler(&engine);
    // Any failed child outranks the two completions.
    assert!(wait_for_status(&engine, aggregate_id, JobStatus::Failed).await);
    stop_scheduler(&engine, scheduler).await;

    let aggregate = engine.get_job(aggregate_id).unwrap();
    let children: Vec<JobStatus> = aggregate
        .children_ids
        .iter()
        .map(|id| engine.get_job(*id).unwrap().status)
        .collect();
    assert_eq!(
        children.iter().filter(|s| **s == JobStatus::Failed).count(),
        1
    );
    assert_eq!(
        children
            .iter()
            .filter(|s| **s == JobStatus::Completed)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_aggregate_of_duplicate_skips_is_completed_at_enqueue() {
    let out = TempDir::new().unwrap();
    std::fs::create_dir_all(out.path().join("pre_pool")).unwrap();
    std::fs::write(out.path().join("pre_pool").join("1_a.png"), b"x").unwrap();
    std::fs::write(out.path().join("pre_pool").join("2_b.png"), b"y").unwrap();

    let settings = Settings {
        duplicate_policy: DuplicatePolicy::Skip,
        ..flat_settings()
    };
    let engine = engine_with(settings);
    let items = vec![
        direct_media("https://example.invalid/a.png", "a", "png"),
        direct_media("https://example.invalid/b.png", "b", "png"),
    ];
    let aggregate_id =
        engine.enqueue_aggregate(GroupType::Pool, items, out.path(), "pre pool");

    // The seed recompute runs synchronously at enqueue, so the aggregate
    // reflects its already-completed children without any scheduler help.
    let aggregate = engine.get_job(aggregate_id).unwrap();
    assert_eq!(aggregate.status, JobStatus::Completed);
    assert_eq!(aggregate.bytes_downloaded, 0);
}

// ==================== Concurrency Bound Tests ====================

#[tokio::test]
async fn test_admission_gate_bounds_simultaneous_downloads() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 256])
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let settings = Settings {
        concurrency: 2,
        ..flat_settings()
    };
    let engine = engine_with(settings);

    let ids: Vec<JobId> = (0..4)
        .map(|n| {
            engine.enqueue(
                direct_media(
                    &format!("{}/{n}.png", mock_server.uri()),
                    &format!("item{n}"),
                    "png",
                ),
                out.path(),
            )
        })
        .collect();

    let scheduler = spawn_scheduler(&engine);

    // Sample while the batch runs: never more than 2 Downloading at once.
    let mut max_observed = 0usize;
    let all_terminal = wait_for(Duration::from_secs(15), || {
        let jobs = engine.list_jobs();
        let downloading = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Downloading)
            .count();
        max_observed = max_observed.max(downloading);
        ids.iter()
            .all(|id| engine.get_job(*id).is_some_and(|job| job.status.is_terminal()))
    })
    .await;
    stop_scheduler(&engine, scheduler).await;

    assert!(all_terminal, "all jobs should reach a terminal state");
    assert!(
        max_observed <= 2,
        "observed {max_observed} simultaneous downloads with capacity 2"
    );
    for id in ids {
        assert_eq!(engine.get_job(id).unwrap().status, JobStatus::Completed);
    }
}

// ==================== Notification Tests ====================

#[tokio::test]
async fn test_status_and_progress_notifications_are_emitted() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 512]))
        .mount(&mock_server)
        .await;

    let out = TempDir::new().unwrap();
    let engine = engine_with(flat_settings());
    let mut status_rx = engine.subscribe_status();
    let mut progress_rx = engine.subscribe_progress();

    let url = format!("{}/file.png", mock_server.uri());
    let id = engine.enqueue(direct_media(&url, "file", "png"), out.path());

    let scheduler = spawn_scheduler(&engine);
    assert!(wait_for_status(&engine, id, JobStatus::Completed).await);
    stop_scheduler(&engine, scheduler).await;

    // Status stream saw the full lifecycle for this job.
    let mut seen = Vec::new();
    while let Ok(event) = status_rx.try_recv() {
        if event.job_id == id {
            seen.push(event.status);
        }
    }
    assert_eq!(seen.first(), Some(&JobStatus::Queued));
    assert!(seen.contains(&JobStatus::Downloading));
    assert_eq!(seen.last(), Some(&JobStatus::Completed));

    // Progress stream reported monotonically growing counters within the
    // advertised total.
    let mut last_bytes = 0;
    let mut any_progress = false;
    while let Ok(event) = progress_rx.try_recv() {
        if event.job_id == id {
            any_progress = true;
            assert!(event.bytes_downloaded >= last_bytes);
            assert!(event.bytes_downloaded <= event.total_bytes);
            last_bytes = event.bytes_downloaded;
        }
    }
    assert!(any_progress, "expected at least one progress event");
    assert_eq!(last_bytes, 512);
}
