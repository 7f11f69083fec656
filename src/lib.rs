//! Rigserver - Inspection Rig Control Server
//!
//! ## Architecture (7 Components)
//!
//! 1. DeviceGateway - HTTP command/capture access to the rig controllers
//! 2. Detector - Image decode + classification adapter
//! 3. DetectionStore - Detection record persistence
//! 4. RealtimeHub - WebSocket event distribution
//! 5. DetectionPipeline - Shared detect-persist-broadcast flow
//! 6. RunController - Autonomous loop lifecycle (single-flight)
//! 7. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - The autonomous loop is the only background task; it is owned and
//!   started/stopped exclusively by the RunController
//! - Every in-cycle failure degrades to backoff-and-continue, never a crash
//! - The loop and the manual upload path share one pipeline

pub mod detect;
pub mod detection_store;
pub mod device_gateway;
pub mod orchestrator;
pub mod pipeline;
pub mod realtime_hub;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
