//! Standalone regression tests.
//!
//! Validates that standalone mode works end to end: the API accepts an
//! upload, the controller starts a worker, the worker answers through the
//! response channel, and the caller gets the correlated outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use relay_core::{BoxFuture, RelayConfig};
use relaygrid_autoscale::InstanceState;
use relaygrid_worker::Inference;
use relayd::Standalone;

const BOUNDARY: &str = "relayd-test";

struct FixedLabel(&'static str);

impl Inference for FixedLabel {
    fn infer<'a>(&'a self, _input: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move { Ok(self.0.to_string()) })
    }
}

fn fast_config(scratch: &Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.submitter.timeout = Duration::from_secs(10);
    config.submitter.poll_interval = Duration::from_millis(20);
    config.listener.wait = Duration::from_millis(200);
    config.controller.max_fleet = 2;
    config.controller.fleet_size = 2;
    config.controller.idle_interval = Duration::from_millis(50);
    config.controller.busy_interval = Duration::from_millis(20);
    config.controller.jitter = Duration::from_millis(10);
    config.worker.receive_wait = Duration::from_millis(200);
    config.worker.idle_sleep = Duration::from_millis(10);
    config.worker.scratch_dir = scratch.to_path_buf();
    config
}

fn upload(filename: &str, data: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"inputFile\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n{data}\r\n--{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn standalone_upload_returns_worker_result() {
    let data_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let config = fast_config(scratch.path());
    let standalone = Standalone::start(&config, data_dir.path(), Arc::new(FixedLabel("Paul")))
        .await
        .unwrap();

    let resp = standalone
        .router
        .clone()
        .oneshot(upload("a.jpg", "jpeg"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "a:Paul");

    let blobs = data_dir.path().join("blobs");
    assert_eq!(std::fs::read(blobs.join("in-bucket/a.jpg")).unwrap(), b"jpeg");
    assert_eq!(std::fs::read(blobs.join("out-bucket/a")).unwrap(), b"Paul");

    standalone.shutdown().await;
}

#[tokio::test]
async fn standalone_concurrent_uploads_are_correlated() {
    let data_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let config = fast_config(scratch.path());
    let standalone = Standalone::start(&config, data_dir.path(), Arc::new(FixedLabel("Emma")))
        .await
        .unwrap();

    let requests = ["a.jpg", "b.jpg", "c.png"].map(|name| {
        let router = standalone.router.clone();
        tokio::spawn(async move {
            let resp = router.oneshot(upload(name, "img")).await.unwrap();
            body_text(resp).await
        })
    });

    let mut bodies = Vec::new();
    for request in requests {
        bodies.push(request.await.unwrap());
    }
    assert_eq!(bodies, vec!["a:Emma", "b:Emma", "c:Emma"]);

    standalone.shutdown().await;
}

#[tokio::test]
async fn standalone_without_workers_times_out() {
    let data_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut config = fast_config(scratch.path());
    config.controller.fleet_size = 0;
    config.submitter.timeout = Duration::from_millis(300);
    let standalone = Standalone::start(&config, data_dir.path(), Arc::new(FixedLabel("Paul")))
        .await
        .unwrap();

    let resp = standalone
        .router
        .clone()
        .oneshot(upload("a.jpg", "jpeg"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "a:Timeout");
    assert_eq!(standalone.fleet.count(InstanceState::Running), 0);

    standalone.shutdown().await;
}

#[tokio::test]
async fn standalone_idle_fleet_scales_back_down() {
    let data_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let config = fast_config(scratch.path());
    let standalone = Standalone::start(&config, data_dir.path(), Arc::new(FixedLabel("Paul")))
        .await
        .unwrap();

    let resp = standalone
        .router
        .clone()
        .oneshot(upload("a.jpg", "jpeg"))
        .await
        .unwrap();
    assert_eq!(body_text(resp).await, "a:Paul");

    // With no backlog the controller stops the worker after two idle cycles.
    tokio::time::timeout(Duration::from_secs(5), async {
        while standalone.fleet.count(InstanceState::Stopped) != 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("fleet did not scale down");

    standalone.shutdown().await;
}

#[tokio::test]
async fn standalone_attribute_mode_serves_seeded_and_computed_values() {
    let data_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let seed = data_dir.path().join("seed.csv");
    std::fs::write(&seed, "test_00,Paul\ntest_01,Emma\n").unwrap();

    let mut config = fast_config(scratch.path());
    config.submitter.attribute_table = Some("results".into());
    config.submitter.attribute_seed = Some(seed);
    let standalone = Standalone::start(&config, data_dir.path(), Arc::new(FixedLabel("Noah")))
        .await
        .unwrap();

    let resp = standalone
        .router
        .clone()
        .oneshot(upload("test_01.jpg", "jpeg"))
        .await
        .unwrap();
    assert_eq!(body_text(resp).await, "test_01:Emma");

    let resp = standalone
        .router
        .clone()
        .oneshot(upload("stranger.jpg", "jpeg"))
        .await
        .unwrap();
    // Not seeded: a worker answers through the attribute table.
    assert_eq!(body_text(resp).await, "stranger:Noah");
    assert_eq!(
        std::fs::read(data_dir.path().join("blobs/out-bucket/stranger")).unwrap(),
        b"Noah"
    );

    standalone.shutdown().await;
}

#[tokio::test]
async fn standalone_rejects_upload_without_file() {
    let data_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let standalone = Standalone::start(
        &fast_config(scratch.path()),
        data_dir.path(),
        Arc::new(FixedLabel("Paul")),
    )
    .await
    .unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        )))
        .unwrap();
    let resp = standalone.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "No file uploaded");

    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = standalone.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    standalone.shutdown().await;
}
