//! Application state
//!
//! Holds all shared components and state

use crate::detection_store::DetectionStore;
use crate::device_gateway::DeviceGateway;
use crate::orchestrator::RunController;
use crate::pipeline::DetectionPipeline;
use crate::realtime_hub::RealtimeHub;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Actuator halt endpoint
    pub stop_url: Option<String>,
    /// Actuator advance endpoint
    pub advance_url: Option<String>,
    /// Camera capture endpoint
    pub capture_url: Option<String>,
    /// Classifier model file (existence-checked at startup when set)
    pub model_path: Option<PathBuf>,
    /// Detection confidence threshold
    pub confidence_threshold: f32,
    /// Detection overlap (NMS) threshold
    pub overlap_threshold: f32,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Allowed CORS origin ("*" for any)
    pub cors_origin: String,
    /// Externally reachable base URL for image links
    pub public_url: String,
    /// Directory where annotated detection images are written
    pub detections_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:rigserver.db?mode=rwc".to_string()),
            stop_url: std::env::var("RIG_STOP_URL").ok(),
            advance_url: std::env::var("RIG_ADVANCE_URL").ok(),
            capture_url: std::env::var("RIG_CAPTURE_URL").ok(),
            model_path: std::env::var("MODEL_PATH").map(PathBuf::from).ok(),
            confidence_threshold: std::env::var("CONF_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.40),
            overlap_threshold: std::env::var("OVERLAP_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.40),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            cors_origin: std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            detections_dir: std::env::var("DETECTIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./static")),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub pool: SqlitePool,
    /// Application config
    pub config: AppConfig,
    /// DeviceGateway (rig controller access)
    pub gateway: Arc<DeviceGateway>,
    /// DetectionStore (record persistence)
    pub store: Arc<DetectionStore>,
    /// RealtimeHub (WebSocket event feed)
    pub realtime: Arc<RealtimeHub>,
    /// DetectionPipeline (shared detect-persist-broadcast flow)
    pub pipeline: Arc<DetectionPipeline>,
    /// RunController (autonomous loop lifecycle)
    pub orchestrator: Arc<RunController>,
}
