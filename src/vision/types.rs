//! Face observation types produced by the recognition engine.

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Numeric label the owner is trained under.
pub const OWNER_LABEL: i32 = 0;

/// Axis-aligned face region in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FaceRect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Map a rectangle found on an image downscaled by `factor` back to
    /// source resolution.
    pub fn upscale(&self, factor: f32) -> Self {
        let up = |v: u32| (v as f32 / factor).round() as u32;
        Self {
            x: up(self.x),
            y: up(self.y),
            w: up(self.w),
            h: up(self.h),
        }
    }

    /// Clip to an image of the given size. `None` if nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.w.min(width - self.x);
        let h = self.h.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Self::new(self.x, self.y, w, h))
    }

    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.w, self.h]
    }
}

/// Who a classified face belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceLabel {
    Owner,
    Intruder,
}

/// Raw classifier output for one canonical face crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Nearest trained label
    pub label: i32,
    /// Distance to that label; lower is a closer match
    pub distance: f64,
}

/// Intruder decision for a single prediction.
///
/// A non-owner label is always an intruder. An owner label is an intruder
/// only when its distance is strictly above `threshold`.
pub fn is_intruder(prediction: &Prediction, owner_label: i32, threshold: f64) -> bool {
    prediction.label != owner_label || prediction.distance > threshold
}

/// One classified face in a sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Region at source resolution
    pub rect: FaceRect,
    /// Classifier label
    pub predicted_label: i32,
    /// Classifier distance; lower is a closer match to the owner
    pub distance: f64,
    pub is_intruder: bool,
}

impl FaceObservation {
    pub fn label(&self) -> FaceLabel {
        if self.is_intruder {
            FaceLabel::Intruder
        } else {
            FaceLabel::Owner
        }
    }
}

/// All faces observed in one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub faces: Vec<FaceObservation>,
    pub sampled_at: DateTime<Local>,
    pub frame_sequence: u64,
}

impl DetectionBatch {
    pub fn empty(frame_sequence: u64) -> Self {
        Self {
            faces: Vec::new(),
            sampled_at: Local::now(),
            frame_sequence,
        }
    }

    /// The "frame intruder signal": at least one face was an intruder.
    pub fn has_intruder(&self) -> bool {
        self.faces.iter().any(|f| f.is_intruder)
    }
}

/// The most recent intruder crop, kept for snapshotting.
#[derive(Debug, Clone)]
pub struct IntruderCrop {
    /// Color crop at source resolution
    pub image: Arc<RgbImage>,
    pub rect: FaceRect,
    pub distance: f64,
    pub captured_at: DateTime<Local>,
}

/// Errors from detection, classification and model artifacts.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("model artifact not found: {0}")]
    ModelMissing(PathBuf),
    #[error("invalid model artifact {path}: {reason}")]
    ModelInvalid { path: PathBuf, reason: String },
    #[error("region detector unavailable: {0}")]
    DetectorUnavailable(String),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_at_threshold_boundary() {
        let at = Prediction { label: OWNER_LABEL, distance: 70.0 };
        let above = Prediction { label: OWNER_LABEL, distance: 70.000_001 };
        let below = Prediction { label: OWNER_LABEL, distance: 69.999_999 };

        assert!(!is_intruder(&at, OWNER_LABEL, 70.0));
        assert!(is_intruder(&above, OWNER_LABEL, 70.0));
        assert!(!is_intruder(&below, OWNER_LABEL, 70.0));
    }

    #[test]
    fn test_non_owner_label_is_always_intruder() {
        for distance in [0.0, 10.0, 69.9, 70.0, 500.0] {
            let p = Prediction { label: 1, distance };
            assert!(is_intruder(&p, OWNER_LABEL, 70.0));
        }
    }

    #[test]
    fn test_rect_upscale_and_clamp() {
        let small = FaceRect::new(10, 20, 40, 45);
        let big = small.upscale(0.5);
        assert_eq!(big, FaceRect::new(20, 40, 80, 90));
        assert_eq!(big.area(), 7200);

        assert_eq!(big.clamp_to(90, 100), Some(FaceRect::new(20, 40, 70, 60)));
        assert_eq!(big.clamp_to(20, 100), None);
    }

    #[test]
    fn test_batch_intruder_signal() {
        let mut batch = DetectionBatch::empty(1);
        assert!(!batch.has_intruder());

        batch.faces.push(FaceObservation {
            rect: FaceRect::new(0, 0, 100, 100),
            predicted_label: OWNER_LABEL,
            distance: 12.0,
            is_intruder: false,
        });
        assert!(!batch.has_intruder());
        assert_eq!(batch.faces[0].label(), FaceLabel::Owner);

        batch.faces.push(FaceObservation {
            rect: FaceRect::new(100, 0, 100, 100),
            predicted_label: OWNER_LABEL,
            distance: 95.0,
            is_intruder: true,
        });
        assert!(batch.has_intruder());
    }
}
