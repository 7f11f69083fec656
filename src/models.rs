//! Shared models and types for Rigserver
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Simple message response for process-control endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Snapshot of the loop state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatusResponse {
    pub is_running: bool,
}

/// Manual submission response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
}

/// One row of the detection history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionHistoryItem {
    pub id: i64,
    pub label: String,
    pub confidence: f64,
    pub detected_at: String,
    pub image_url: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub db_connected: bool,
    pub is_running: bool,
}
