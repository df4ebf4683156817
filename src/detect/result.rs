use serde::Serialize;
use std::path::{Path, PathBuf};

use super::severity::Severity;

/// One bounding box produced by a backend.
///
/// Coordinates are normalized to `0..1` relative to the frame, with `(x, y)`
/// the top-left corner.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    /// A detection qualifies when its confidence meets or exceeds `threshold`.
    pub fn qualifies(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` clamped to a `width` x `height` frame.
    /// Bounds are inclusive.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let x0 = (self.x * width as f32).clamp(0.0, max_x);
        let y0 = (self.y * height as f32).clamp(0.0, max_y);
        let x1 = ((self.x + self.w) * width as f32).clamp(0.0, max_x);
        let y1 = ((self.y + self.h) * height as f32).clamp(0.0, max_y);
        if x1 < x0 || y1 < y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix0 = self.x.max(other.x);
        let iy0 = self.y.max(other.y);
        let ix1 = (self.x + self.w).min(other.x + other.w);
        let iy1 = (self.y + self.h).min(other.y + other.h);
        let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
        let union = self.w * self.h + other.w * other.h - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Outcome of a classification call. Immutable once returned.
///
/// Results are read through accessors:
///
/// ```
/// fn describe(result: &civic_triage::DetectionResult) -> String {
///     format!("{} boxes, {}", result.box_count(), result.severity())
/// }
/// ```
///
/// Only the detector builds results, and severity always follows the count:
///
/// ```compile_fail
/// use civic_triage::DetectionResult;
/// use std::path::PathBuf;
///
/// let _forged = DetectionResult::new(0, PathBuf::from("forged.png"));
/// ```
///
/// ```compile_fail
/// use civic_triage::{DetectionResult, Severity};
/// use std::path::PathBuf;
///
/// let _forged = DetectionResult {
///     box_count: 0,
///     severity: Severity::Critical,
///     annotated_output_path: PathBuf::from("forged.png"),
/// };
/// ```
///
/// A returned result cannot be edited:
///
/// ```compile_fail
/// fn inflate(result: &mut civic_triage::DetectionResult) {
///     result.box_count = 9;
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    box_count: u32,
    severity: Severity,
    #[serde(rename = "annotated_output")]
    annotated_output_path: PathBuf,
}

impl DetectionResult {
    pub(crate) fn new(box_count: u32, annotated_output_path: PathBuf) -> Self {
        Self {
            box_count,
            severity: Severity::from_box_count(box_count),
            annotated_output_path,
        }
    }

    /// Exact number of qualifying detections. Zero means the report is discarded.
    pub fn box_count(&self) -> u32 {
        self.box_count
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn annotated_output_path(&self) -> &Path {
        &self.annotated_output_path
    }

    pub fn has_hazard(&self) -> bool {
        self.box_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence: 0.9,
            class_id: 0,
        }
    }

    #[test]
    fn pixel_bounds_are_clamped() {
        let d = det(0.5, 0.5, 0.75, 0.75);
        assert_eq!(d.pixel_bounds(100, 50), Some((50, 25, 99, 49)));
        assert_eq!(d.pixel_bounds(0, 50), None);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = det(0.1, 0.1, 0.2, 0.2);
        let b = det(0.6, 0.6, 0.2, 0.2);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn result_derives_severity_from_count() {
        let r = DetectionResult::new(5, PathBuf::from("out.png"));
        assert_eq!(r.severity(), Severity::Critical);
        assert!(r.has_hazard());
        assert!(!DetectionResult::new(0, PathBuf::new()).has_hazard());
    }
}
