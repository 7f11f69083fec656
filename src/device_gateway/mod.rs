//! DeviceGateway - Rig Controller Access
//!
//! ## Responsibilities
//!
//! - Fire-and-forget GET commands to the actuator controller
//! - Frame capture from the camera controller
//! - Failure classification (connection vs. bad status)
//!
//! Each call is stateless and carries its own timeout. Retry policy
//! belongs to the caller.

use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;

/// Gateway failure classification.
///
/// A completed HTTP exchange with a non-2xx status is a different outcome
/// from a connection-level failure (refused, DNS, timeout); callers log
/// them differently even when they recover the same way.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Device unreachable: refused connection, DNS failure, or timeout
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// Device responded, but not with success
    #[error("device responded with status {0}")]
    Status(StatusCode),
}

/// DeviceGateway instance
pub struct DeviceGateway {
    client: reqwest::Client,
}

impl DeviceGateway {
    /// Create new DeviceGateway
    ///
    /// No client-level timeout is set; every call supplies its own.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Send a command to a controller endpoint
    ///
    /// Returns the response status on any completed exchange. The rig
    /// controllers acknowledge with plain 200s and no useful body, so the
    /// status is all a caller can act on.
    pub async fn send_command(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<StatusCode, GatewayError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        Ok(resp.status())
    }

    /// Fetch a camera frame from a capture endpoint
    ///
    /// Non-2xx responses are reported as `GatewayError::Status` so the
    /// caller can distinguish "camera answered badly" from "camera gone".
    pub async fn fetch_image(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<Bytes, GatewayError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }

        Ok(resp.bytes().await?)
    }
}

impl Default for DeviceGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_refused_classifies_as_connection_error() {
        // Bind an ephemeral port, then drop the listener so nothing serves it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway = DeviceGateway::new();
        let result = gateway
            .send_command(&format!("http://{}/stop", addr), Duration::from_millis(500))
            .await;

        match result {
            Err(GatewayError::Connection(_)) => {}
            other => panic!("expected connection error, got {:?}", other.map(|s| s.as_u16())),
        }
    }

    #[tokio::test]
    async fn fetch_image_reports_bad_status_distinctly() {
        use axum::{routing::get, Router};

        let app = Router::new().route(
            "/capture",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let gateway = DeviceGateway::new();
        let result = gateway
            .fetch_image(
                &format!("http://{}/capture", addr),
                Duration::from_secs(2),
            )
            .await;

        match result {
            Err(GatewayError::Status(status)) => assert_eq!(status.as_u16(), 503),
            other => panic!("expected status error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn send_command_returns_status_of_completed_exchange() {
        use axum::{routing::get, Router};

        let app = Router::new().route("/stop", get(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let gateway = DeviceGateway::new();
        let status = gateway
            .send_command(&format!("http://{}/stop", addr), Duration::from_secs(2))
            .await
            .unwrap();

        assert!(status.is_success());
    }
}
