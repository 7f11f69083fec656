use anyhow::Result;
use image::RgbImage;

use super::Detection;

/// Classifier backend trait.
///
/// The classification model stays behind this seam: the rest of the
/// system only ever sees decoded frames going in and labeled boxes
/// coming out. Backends receive both thresholds because threshold
/// handling (score cut-off, box suppression) is model-specific.
pub trait Classifier: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns false when the backend cannot serve yet (model missing).
    fn is_ready(&self) -> bool {
        true
    }

    /// Run classification on a decoded frame.
    fn classify(
        &self,
        image: &RgbImage,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<Detection>>;
}
