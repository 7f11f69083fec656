//! Rigserver - Inspection Rig Control Server
//!
//! Main entry point for the rigserver application.

use rigserver::{
    detect::{Detector, StubClassifier},
    detection_store::DetectionStore,
    device_gateway::DeviceGateway,
    orchestrator::{EndpointConfig, LoopTimings, RunController},
    pipeline::DetectionPipeline,
    realtime_hub::RealtimeHub,
    state::{AppConfig, AppState},
    web_api,
};
use axum::http::HeaderValue;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rigserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rigserver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database_url = %config.database_url,
        stop_url = ?config.stop_url,
        advance_url = ?config.advance_url,
        capture_url = ?config.capture_url,
        detections_dir = %config.detections_dir.display(),
        confidence_threshold = %config.confidence_threshold,
        overlap_threshold = %config.overlap_threshold,
        "Configuration loaded"
    );

    // A configured-but-missing model file is a startup error; a missing
    // endpoint is not (it only blocks loop start).
    if let Some(ref model_path) = config.model_path {
        if !model_path.exists() {
            anyhow::bail!("MODEL_PATH does not exist: {}", model_path.display());
        }
    }

    // Create database pool
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    // Initialize components
    let store = Arc::new(DetectionStore::new(pool.clone()));
    store.init().await?;
    tracing::info!("DetectionStore initialized");

    tokio::fs::create_dir_all(&config.detections_dir).await?;

    let realtime = Arc::new(RealtimeHub::new());
    let gateway = Arc::new(DeviceGateway::new());

    let detector = Arc::new(Detector::new(
        Box::new(StubClassifier::empty()),
        config.confidence_threshold,
        config.overlap_threshold,
    ));
    tracing::warn!(
        backend = %detector.backend_name(),
        "No model backend compiled in; classifier stub active"
    );

    let pipeline = Arc::new(DetectionPipeline::new(
        detector,
        store.clone(),
        realtime.clone(),
        config.detections_dir.clone(),
        config.public_url.clone(),
    ));
    tracing::info!("DetectionPipeline initialized");

    let orchestrator = Arc::new(RunController::new(
        EndpointConfig {
            stop_url: config.stop_url.clone(),
            capture_url: config.capture_url.clone(),
            advance_url: config.advance_url.clone(),
        },
        gateway.clone(),
        pipeline.clone(),
        realtime.clone(),
        LoopTimings::default(),
    ));
    tracing::info!("RunController initialized");

    // Create application state
    let state = AppState {
        pool,
        config: config.clone(),
        gateway,
        store,
        realtime,
        pipeline,
        orchestrator,
    };

    // Create router with annotated-image serving
    let serve_dir = ServeDir::new(&config.detections_dir);

    let cors = if config.cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = web_api::create_router(state.clone())
        .nest_service("/static", serve_dir)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(detections_dir = %config.detections_dir.display(), "Static image serving enabled");

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
