//! DetectionPipeline - Shared Detect-Persist-Broadcast Flow
//!
//! ## Responsibilities
//!
//! - Run the classifier on a decoded frame
//! - Persist the annotated composite + one record per detection
//! - Broadcast detection events after the batch commits
//!
//! Both the autonomous loop and the manual upload endpoint run this exact
//! flow; all records of one frame share one timestamp and one composite
//! image, and are inserted in one transaction.

use crate::detect::{self, Detector};
use crate::detection_store::{round_confidence, DetectionStore, NewDetection};
use crate::error::{Error, Result};
use crate::realtime_hub::{
    HubMessage, LogLevel, NewDetectionMessage, RealtimeHub, DISPLAY_TIME_FORMAT,
};
use chrono::Utc;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

/// DetectionPipeline instance
pub struct DetectionPipeline {
    detector: Arc<Detector>,
    store: Arc<DetectionStore>,
    hub: Arc<RealtimeHub>,
    /// Directory served at /static where composites are written
    images_dir: PathBuf,
    /// Externally reachable base URL used to resolve image links
    public_base_url: String,
}

impl DetectionPipeline {
    /// Create new DetectionPipeline
    pub fn new(
        detector: Arc<Detector>,
        store: Arc<DetectionStore>,
        hub: Arc<RealtimeHub>,
        images_dir: PathBuf,
        public_base_url: String,
    ) -> Self {
        Self {
            detector,
            store,
            hub,
            images_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Decode raw frame bytes (delegates to the detector)
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        self.detector.decode(bytes)
    }

    /// Whether the classifier backend can serve
    pub fn detector_ready(&self) -> bool {
        self.detector.is_ready()
    }

    /// Resolve a stored image filename to an externally fetchable URL
    pub fn image_url(&self, filename: &str) -> String {
        format!("{}/static/{}", self.public_base_url, filename)
    }

    /// Run the full pipeline on one decoded frame
    ///
    /// Returns the number of detections persisted. An empty batch is a
    /// valid result: it logs and returns 0 without touching storage or
    /// emitting detection events.
    pub async fn process(&self, frame: RgbImage) -> Result<usize> {
        let now = Utc::now();

        let batch = self.detector.detect(&frame)?;
        if batch.is_empty() {
            self.hub
                .log(LogLevel::Info, "no objects detected in frame")
                .await;
            return Ok(0);
        }

        let annotated = batch
            .annotated
            .as_ref()
            .ok_or_else(|| Error::Internal("non-empty batch without composite image".into()))?;

        let filename = format!("detection_{}.jpg", Uuid::new_v4());
        let jpeg = detect::encode_jpeg(annotated)?;
        fs::create_dir_all(&self.images_dir).await?;
        fs::write(self.images_dir.join(&filename), &jpeg).await?;

        let rows: Vec<NewDetection> = batch
            .detections
            .iter()
            .map(|d| NewDetection {
                detected_at: now,
                label: d.label.clone(),
                confidence: round_confidence(d.confidence),
                image_path: filename.clone(),
            })
            .collect();

        let records = match self.store.insert_batch(&rows).await {
            Ok(records) => records,
            Err(e) => {
                self.hub
                    .log(
                        LogLevel::Error,
                        format!("failed to persist detections: {}", e),
                    )
                    .await;
                return Err(e);
            }
        };

        // Events go out only once the batch is durable; observers never see
        // a record that a store read cannot find.
        let image_url = self.image_url(&filename);
        for record in &records {
            self.hub
                .broadcast(HubMessage::NewDetection(NewDetectionMessage {
                    id: record.id,
                    detected_at: record.detected_at.format(DISPLAY_TIME_FORMAT).to_string(),
                    label: record.label.clone(),
                    confidence: record.confidence,
                    image_url: image_url.clone(),
                }))
                .await;
        }

        self.hub
            .log(
                LogLevel::Success,
                format!("{} detections saved to store", records.len()),
            )
            .await;

        tracing::info!(
            count = records.len(),
            image = %filename,
            "Detection batch processed"
        );

        Ok(records.len())
    }
}
