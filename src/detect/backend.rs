use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object-detection backend.
///
/// A backend is loaded once and then shared read-only across concurrent
/// classification calls, so `detect` takes `&self` and implementations must
/// be `Send + Sync`.
///
/// Backends return every candidate they find together with its confidence.
/// Thresholding against the configured confidence happens in the detector,
/// never in the backend, so the reported count stays exact.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one RGB frame.
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
