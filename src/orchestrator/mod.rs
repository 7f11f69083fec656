//! RunController - Autonomous Loop Lifecycle
//!
//! ## Responsibilities
//!
//! - Single-flight start/stop/status over the autonomous rig loop
//! - Endpoint configuration validation at start
//! - Ownership of the background task handle
//!
//! The loop itself runs a fixed command sequence per cycle
//! (halt rig -> settle -> capture -> detect -> advance rig) and converts
//! every in-cycle failure into backoff-and-continue. Stop is cooperative:
//! the run flag is observed between steps, and an in-flight device call is
//! always allowed to finish, so stop latency is bounded by one call
//! timeout.

use crate::device_gateway::{DeviceGateway, GatewayError};
use crate::error::{Error, Result};
use crate::pipeline::DetectionPipeline;
use crate::realtime_hub::{
    CycleStartMessage, HubMessage, LogLevel, LoopStoppedMessage, RealtimeHub,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Device endpoint configuration as supplied by the environment.
///
/// All three must be present before the loop may start; anything missing
/// is a configuration error, reported at start, never a crash.
#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    pub stop_url: Option<String>,
    pub capture_url: Option<String>,
    pub advance_url: Option<String>,
}

impl EndpointConfig {
    fn resolve(&self) -> Result<RigEndpoints> {
        let mut missing = Vec::new();
        if self.stop_url.is_none() {
            missing.push("stop");
        }
        if self.capture_url.is_none() {
            missing.push("capture");
        }
        if self.advance_url.is_none() {
            missing.push("advance");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "device endpoints not configured: {}",
                missing.join(", ")
            )));
        }

        Ok(RigEndpoints {
            stop_url: self.stop_url.clone().unwrap_or_default(),
            capture_url: self.capture_url.clone().unwrap_or_default(),
            advance_url: self.advance_url.clone().unwrap_or_default(),
        })
    }
}

/// Resolved endpoints, immutable for the lifetime of one loop run
#[derive(Debug, Clone)]
struct RigEndpoints {
    stop_url: String,
    capture_url: String,
    advance_url: String,
}

/// Per-step timing of the loop
#[derive(Debug, Clone, Copy)]
pub struct LoopTimings {
    /// Timeout for the halt command
    pub stop_timeout: Duration,
    /// Timeout for the frame capture
    pub capture_timeout: Duration,
    /// Timeout for the advance command
    pub advance_timeout: Duration,
    /// Settle delay after halt and after advance
    pub settle_delay: Duration,
    /// Backoff after a failed step before the next cycle
    pub error_backoff: Duration,
}

impl Default for LoopTimings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(10),
            advance_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// RunController instance
pub struct RunController {
    endpoints: EndpointConfig,
    gateway: Arc<DeviceGateway>,
    pipeline: Arc<DetectionPipeline>,
    hub: Arc<RealtimeHub>,
    timings: LoopTimings,
    run_flag: Arc<AtomicBool>,
    active_loops: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RunController {
    /// Create new RunController
    pub fn new(
        endpoints: EndpointConfig,
        gateway: Arc<DeviceGateway>,
        pipeline: Arc<DetectionPipeline>,
        hub: Arc<RealtimeHub>,
        timings: LoopTimings,
    ) -> Self {
        Self {
            endpoints,
            gateway,
            pipeline,
            hub,
            timings,
            run_flag: Arc::new(AtomicBool::new(false)),
            active_loops: Arc::new(AtomicU64::new(0)),
            handle: Mutex::new(None),
        }
    }

    /// Start the autonomous loop
    ///
    /// Check-and-set happens under the handle lock so that concurrent
    /// calls can never both spawn a task. A previous loop still draining
    /// its final cycle is awaited first (bounded by one call timeout).
    pub async fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;

        if self.run_flag.load(Ordering::SeqCst) {
            return Err(Error::Conflict("process already running".into()));
        }

        let endpoints = self.endpoints.resolve()?;
        if !self.pipeline.detector_ready() {
            return Err(Error::Config("classifier backend is not ready".into()));
        }

        if let Some(prev) = handle.take() {
            if !prev.is_finished() {
                tracing::debug!("Waiting for previous loop task to drain");
            }
            let _ = prev.await;
        }

        self.run_flag.store(true, Ordering::SeqCst);
        // Counted here, under the lock, so callers observe the new task
        // as soon as start() returns; the task decrements on exit.
        self.active_loops.fetch_add(1, Ordering::SeqCst);

        let task = CycleTask {
            endpoints,
            gateway: self.gateway.clone(),
            pipeline: self.pipeline.clone(),
            hub: self.hub.clone(),
            timings: self.timings,
            run_flag: self.run_flag.clone(),
            active_loops: self.active_loops.clone(),
        };

        *handle = Some(tokio::spawn(task.run()));

        tracing::info!("Autonomous loop started");
        Ok(())
    }

    /// Request a cooperative stop
    ///
    /// Returns immediately; the loop halts after the step it is currently
    /// waiting on. Status reads false from this point on.
    pub async fn stop(&self) -> Result<()> {
        if !self.run_flag.swap(false, Ordering::SeqCst) {
            return Err(Error::Conflict("process is not running".into()));
        }

        self.hub
            .log(
                LogLevel::Info,
                "stop requested; loop will halt after the current cycle",
            )
            .await;

        tracing::info!("Autonomous loop stop requested");
        Ok(())
    }

    /// Snapshot of the run flag; no side effects
    pub fn is_running(&self) -> bool {
        self.run_flag.load(Ordering::SeqCst)
    }

    /// Number of live loop tasks (0 or 1 by construction)
    pub fn active_loops(&self) -> u64 {
        self.active_loops.load(Ordering::SeqCst)
    }
}

/// The background loop task; owns its clones of the shared components
struct CycleTask {
    endpoints: RigEndpoints,
    gateway: Arc<DeviceGateway>,
    pipeline: Arc<DetectionPipeline>,
    hub: Arc<RealtimeHub>,
    timings: LoopTimings,
    run_flag: Arc<AtomicBool>,
    active_loops: Arc<AtomicU64>,
}

impl CycleTask {
    async fn run(self) {
        self.hub
            .log(LogLevel::Info, "autonomous loop started")
            .await;

        let mut cycle: u64 = 0;
        while self.run_flag.load(Ordering::SeqCst) {
            cycle += 1;
            self.hub
                .broadcast(HubMessage::CycleStart(CycleStartMessage { cycle }))
                .await;
            tracing::debug!(cycle = cycle, "Cycle started");

            // Halt the rig so the frame is sharp.
            match self
                .gateway
                .send_command(&self.endpoints.stop_url, self.timings.stop_timeout)
                .await
            {
                Ok(_) => {
                    self.hub
                        .log(LogLevel::Cmd, "stop command sent to actuator")
                        .await;
                    sleep(self.timings.settle_delay).await;
                }
                Err(e) => {
                    self.hub
                        .log(
                            LogLevel::Error,
                            format!("actuator unreachable on stop command: {}", e),
                        )
                        .await;
                    sleep(self.timings.error_backoff).await;
                    continue;
                }
            }

            if !self.run_flag.load(Ordering::SeqCst) {
                break;
            }

            let bytes = match self
                .gateway
                .fetch_image(&self.endpoints.capture_url, self.timings.capture_timeout)
                .await
            {
                Ok(bytes) => bytes,
                Err(GatewayError::Status(status)) => {
                    self.hub
                        .log(
                            LogLevel::Warning,
                            format!("camera responded with status {}", status),
                        )
                        .await;
                    sleep(self.timings.error_backoff).await;
                    continue;
                }
                Err(e) => {
                    self.hub
                        .log(LogLevel::Warning, format!("camera unreachable: {}", e))
                        .await;
                    sleep(self.timings.error_backoff).await;
                    continue;
                }
            };

            let frame = match self.pipeline.decode(&bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    self.hub
                        .log(
                            LogLevel::Warning,
                            format!("captured frame could not be decoded: {}", e),
                        )
                        .await;
                    continue;
                }
            };

            if let Err(e) = self.pipeline.process(frame).await {
                // Already logged to the event feed by the pipeline; the
                // cycle goes on, a store failure must not halt the rig.
                tracing::error!(cycle = cycle, error = %e, "Detection pipeline failed");
            }

            if !self.run_flag.load(Ordering::SeqCst) {
                break;
            }

            // Advance regardless of acknowledgement; the rig must keep
            // moving even when the ack path is unreliable.
            match self
                .gateway
                .send_command(&self.endpoints.advance_url, self.timings.advance_timeout)
                .await
            {
                Ok(_) => {
                    self.hub
                        .log(LogLevel::Cmd, "advance command sent to actuator")
                        .await;
                }
                Err(e) => {
                    self.hub
                        .log(
                            LogLevel::Warning,
                            format!("advance command not acknowledged: {}", e),
                        )
                        .await;
                }
            }
            sleep(self.timings.settle_delay).await;
        }

        self.hub
            .broadcast(HubMessage::LoopStopped(LoopStoppedMessage {}))
            .await;
        self.hub
            .log(LogLevel::Info, "autonomous loop stopped")
            .await;
        tracing::info!(cycles = cycle, "Autonomous loop stopped");
        self.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_names_every_missing_endpoint() {
        let config = EndpointConfig {
            stop_url: Some("http://rig/stop".into()),
            capture_url: None,
            advance_url: None,
        };

        match config.resolve() {
            Err(Error::Config(msg)) => {
                assert!(msg.contains("capture"));
                assert!(msg.contains("advance"));
                assert!(!msg.contains("stop,"));
            }
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn resolve_passes_with_all_endpoints() {
        let config = EndpointConfig {
            stop_url: Some("http://rig/stop".into()),
            capture_url: Some("http://cam/capture".into()),
            advance_url: Some("http://rig/start".into()),
        };
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn default_timings_match_rig_pacing() {
        let timings = LoopTimings::default();
        assert_eq!(timings.stop_timeout, Duration::from_secs(5));
        assert_eq!(timings.capture_timeout, Duration::from_secs(10));
        assert_eq!(timings.advance_timeout, Duration::from_secs(5));
        assert_eq!(timings.settle_delay, Duration::from_secs(5));
        assert_eq!(timings.error_backoff, Duration::from_secs(5));
    }
}
