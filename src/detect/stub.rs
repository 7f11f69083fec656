use anyhow::Result;
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::backend::Classifier;
use super::{BBox, Detection};

/// Stub backend for testing and model-less deployments.
///
/// Replays a scripted sequence of detection batches, one batch per
/// `classify` call; once the script is exhausted every call reports
/// nothing detected.
pub struct StubClassifier {
    script: Mutex<VecDeque<Vec<Detection>>>,
}

impl StubClassifier {
    /// Backend that never detects anything.
    pub fn empty() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Backend that replays the given batches in order.
    pub fn with_batches(batches: Vec<Vec<Detection>>) -> Self {
        Self {
            script: Mutex::new(batches.into()),
        }
    }

    /// Convenience constructor for a scripted detection.
    pub fn detection(label: &str, confidence: f32, bbox: BBox) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox,
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::empty()
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(
        &self,
        _image: &RgbImage,
        _confidence_threshold: f32,
        _overlap_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| anyhow::anyhow!("stub script lock poisoned"))?;
        Ok(script.pop_front().unwrap_or_default())
    }
}
