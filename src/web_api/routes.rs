//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::models::{DetectionHistoryItem, MessageResponse, ProcessStatusResponse, SubmitResponse};
use crate::realtime_hub::{HubMessage, StoreClearedMessage, DISPLAY_TIME_FORMAT};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Process control
        .route("/api/start-process", post(start_process))
        .route("/api/stop-process", post(stop_process))
        .route("/api/process-status", get(process_status))
        // Detections
        .route("/api/detect", post(submit_detection))
        .route("/api/detections-history", get(detections_history))
        .route("/api/delete/all", delete(delete_all_detections))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Process Control Handlers
// ========================================

async fn start_process(State(state): State<AppState>) -> Response {
    match state.orchestrator.start().await {
        Ok(()) => Json(MessageResponse::new("autonomous process started")).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn stop_process(State(state): State<AppState>) -> Response {
    match state.orchestrator.stop().await {
        Ok(()) => Json(MessageResponse::new(
            "stop requested; the process halts after the current cycle",
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn process_status(State(state): State<AppState>) -> Response {
    Json(ProcessStatusResponse {
        is_running: state.orchestrator.is_running(),
    })
    .into_response()
}

// ========================================
// Detection Handlers
// ========================================

/// Manual image submission: runs the same pipeline as the autonomous loop
async fn submit_detection(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut upload: Option<Bytes> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    match field.bytes().await {
                        Ok(bytes) => {
                            upload = Some(bytes);
                            break;
                        }
                        Err(e) => {
                            return (
                                StatusCode::BAD_REQUEST,
                                Json(json!({"error": format!("failed to read upload: {}", e)})),
                            )
                                .into_response();
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("invalid multipart body: {}", e)})),
                )
                    .into_response();
            }
        }
    }

    let Some(bytes) = upload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No image provided"})),
        )
            .into_response();
    };

    let frame = match state.pipeline.decode(&bytes) {
        Ok(frame) => frame,
        Err(e) => return e.into_response(),
    };

    match state.pipeline.process(frame).await {
        Ok(count) => Json(SubmitResponse {
            success: true,
            message: format!("image processed, {} detections", count),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn detections_history(State(state): State<AppState>) -> Response {
    match state.store.list_all().await {
        Ok(records) => {
            let items: Vec<DetectionHistoryItem> = records
                .iter()
                .map(|r| DetectionHistoryItem {
                    id: r.id,
                    label: r.label.clone(),
                    confidence: r.confidence,
                    detected_at: r.detected_at.format(DISPLAY_TIME_FORMAT).to_string(),
                    image_url: state.pipeline.image_url(&r.image_path),
                })
                .collect();
            Json(items).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn delete_all_detections(State(state): State<AppState>) -> Response {
    match state.store.delete_all().await {
        Ok(deleted) => {
            state
                .realtime
                .broadcast(HubMessage::StoreCleared(StoreClearedMessage {}))
                .await;
            Json(json!({
                "message": format!("deleted {} detections", deleted),
                "deleted": deleted
            }))
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ========================================
// WebSocket Handler
// ========================================

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = state.realtime.register().await;

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages (ping/pong, close)
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    // Wait for either task to complete
    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    // Unregister from hub
    state.realtime.unregister(&conn_id).await;
}
