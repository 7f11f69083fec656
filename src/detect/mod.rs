//! Detector - Image Decode + Classification Adapter
//!
//! ## Responsibilities
//!
//! - Decode captured frame bytes into raster images
//! - Run the classifier backend with the configured thresholds
//! - Render the annotated composite for non-empty batches
//!
//! A malformed frame (bytes that are not a raster image) is the only hard
//! error here; callers catch and log it, never crash on it. "Nothing
//! detected" is a valid, empty result.

mod backend;
mod stub;

pub use backend::Classifier;
pub use stub::StubClassifier;

use crate::error::{Error, Result};
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Box outline color for annotated composites
const BOX_COLOR: Rgb<u8> = Rgb([237, 28, 36]);
/// Box outline thickness in pixels
const BOX_THICKNESS: u32 = 2;

/// One classified object instance in a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// Result of one inference call: the detections plus, when anything was
/// found, the frame with all boxes burned in.
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
    pub annotated: Option<RgbImage>,
}

impl DetectionBatch {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Detector instance
pub struct Detector {
    backend: Box<dyn Classifier>,
    confidence_threshold: f32,
    overlap_threshold: f32,
}

impl Detector {
    /// Create new Detector over a classifier backend
    pub fn new(backend: Box<dyn Classifier>, confidence_threshold: f32, overlap_threshold: f32) -> Self {
        Self {
            backend,
            confidence_threshold,
            overlap_threshold,
        }
    }

    /// Backend identifier (for startup logging)
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether the backend can serve
    pub fn is_ready(&self) -> bool {
        self.backend.is_ready()
    }

    /// Decode frame bytes into an RGB image
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| Error::Decode(format!("frame is not a decodable image: {}", e)))?;
        Ok(img.to_rgb8())
    }

    /// Run classification on a decoded frame
    ///
    /// Detections under the confidence threshold are dropped here even if
    /// the backend returned them; the annotated composite is rendered only
    /// for non-empty batches.
    pub fn detect(&self, image: &RgbImage) -> Result<DetectionBatch> {
        let detections = self
            .backend
            .classify(image, self.confidence_threshold, self.overlap_threshold)
            .map_err(|e| Error::Internal(format!("classifier backend failed: {}", e)))?;

        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();

        if detections.is_empty() {
            return Ok(DetectionBatch {
                detections,
                annotated: None,
            });
        }

        let annotated = render_annotated(image, &detections);
        Ok(DetectionBatch {
            detections,
            annotated: Some(annotated),
        })
    }
}

/// Encode an RGB image as JPEG bytes
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Jpeg)
        .map_err(|e| Error::Internal(format!("failed to encode annotated image: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Copy the frame and burn every bounding box into it
fn render_annotated(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut out = frame.clone();
    for detection in detections {
        draw_box(&mut out, &detection.bbox);
    }
    out
}

/// Draw a hollow rectangle, clamped to the image bounds
fn draw_box(img: &mut RgbImage, bbox: &BBox) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let x1 = (bbox.x1.max(0.0) as u32).min(width - 1);
    let y1 = (bbox.y1.max(0.0) as u32).min(height - 1);
    let x2 = (bbox.x2.max(0.0) as u32).min(width - 1);
    let y2 = (bbox.y2.max(0.0) as u32).min(height - 1);
    if x1 >= x2 || y1 >= y2 {
        return;
    }

    for t in 0..BOX_THICKNESS {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            img.put_pixel(x, top, BOX_COLOR);
            img.put_pixel(x, bottom, BOX_COLOR);
        }

        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            img.put_pixel(left, y, BOX_COLOR);
            img.put_pixel(right, y, BOX_COLOR);
        }
    }
}
