//! Shared helpers for integration tests: in-memory store, scripted
//! classifier pipeline, and a simulated rig device server.
#![allow(dead_code)]

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use image::{Rgb, RgbImage};
use rigserver::detect::{encode_jpeg, Detection, Detector, StubClassifier};
use rigserver::detection_store::DetectionStore;
use rigserver::device_gateway::DeviceGateway;
use rigserver::orchestrator::{EndpointConfig, LoopTimings, RunController};
use rigserver::pipeline::DetectionPipeline;
use rigserver::realtime_hub::RealtimeHub;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Store over a single-connection in-memory database (each `:memory:`
/// connection is its own database, so the pool must stay at one).
pub async fn memory_store() -> Arc<DetectionStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let store = Arc::new(DetectionStore::new(pool));
    store.init().await.expect("schema init");
    store
}

/// A small patterned frame, JPEG-encoded
pub fn test_frame_jpeg() -> Vec<u8> {
    let frame = RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 128]));
    encode_jpeg(&frame).expect("encode test frame")
}

/// A small patterned frame, decoded
pub fn test_frame() -> RgbImage {
    RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 128]))
}

/// Simulated rig: actuator stop/advance endpoints plus a camera capture
/// endpoint that either serves a JPEG frame or fails with 503.
pub async fn spawn_device_sim(capture_ok: bool) -> SocketAddr {
    let jpeg = test_frame_jpeg();
    let app = Router::new()
        .route("/stop", get(|| async { "stopped" }))
        .route("/start", get(|| async { "advancing" }))
        .route(
            "/capture",
            get(move || {
                let jpeg = jpeg.clone();
                async move {
                    if capture_ok {
                        (StatusCode::OK, jpeg).into_response()
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, Vec::<u8>::new()).into_response()
                    }
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind device sim");
    let addr = listener.local_addr().expect("device sim addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("device sim serve");
    });
    addr
}

/// Everything needed to drive the orchestrator in a test
pub struct TestRig {
    pub controller: Arc<RunController>,
    pub hub: Arc<RealtimeHub>,
    pub store: Arc<DetectionStore>,
    pub images: TempDir,
}

/// Millisecond-scale loop timings so tests run in real time
pub fn fast_timings() -> LoopTimings {
    LoopTimings {
        stop_timeout: Duration::from_millis(500),
        capture_timeout: Duration::from_millis(500),
        advance_timeout: Duration::from_millis(500),
        settle_delay: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
    }
}

/// Build a pipeline over a scripted classifier and a temp image directory
pub async fn scripted_pipeline(
    batches: Vec<Vec<Detection>>,
    store: Arc<DetectionStore>,
    hub: Arc<RealtimeHub>,
    images: &TempDir,
) -> Arc<DetectionPipeline> {
    let detector = Arc::new(Detector::new(
        Box::new(StubClassifier::with_batches(batches)),
        0.4,
        0.4,
    ));
    Arc::new(DetectionPipeline::new(
        detector,
        store,
        hub,
        images.path().to_path_buf(),
        "http://testhost".to_string(),
    ))
}

/// Controller wired against the given device sim
pub async fn test_rig(sim: SocketAddr, batches: Vec<Vec<Detection>>) -> TestRig {
    let store = memory_store().await;
    let hub = Arc::new(RealtimeHub::new());
    let images = TempDir::new().expect("temp image dir");
    let pipeline = scripted_pipeline(batches, store.clone(), hub.clone(), &images).await;

    let controller = Arc::new(RunController::new(
        EndpointConfig {
            stop_url: Some(format!("http://{}/stop", sim)),
            capture_url: Some(format!("http://{}/capture", sim)),
            advance_url: Some(format!("http://{}/start", sim)),
        },
        Arc::new(DeviceGateway::new()),
        pipeline,
        hub.clone(),
        fast_timings(),
    ));

    TestRig {
        controller,
        hub,
        store,
        images,
    }
}

/// Receive the next hub event as parsed JSON, with a deadline
pub async fn next_event(rx: &mut UnboundedReceiver<String>) -> serde_json::Value {
    let raw = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for hub event")
        .expect("hub channel closed");
    serde_json::from_str(&raw).expect("hub event is JSON")
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
