//! Alert events and the outward alert payload.

use crate::vision::{FaceRect, IntruderCrop};
use chrono::{DateTime, Local, SecondsFormat};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Event name carried by every alert payload.
pub const INTRUDER_EVENT: &str = "intruder_detected";

/// One fired alert, built from the cached intruder crop.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub id: Uuid,
    pub snapshot: Arc<RgbImage>,
    pub timestamp: DateTime<Local>,
    pub bbox: FaceRect,
    /// Classifier distance of the cached crop
    pub confidence: f64,
}

impl AlertEvent {
    pub fn from_intruder(crop: &IntruderCrop) -> Self {
        Self {
            id: Uuid::new_v4(),
            snapshot: crop.image.clone(),
            timestamp: Local::now(),
            bbox: crop.rect,
            confidence: crop.distance,
        }
    }

    /// Payload referencing a persisted snapshot.
    pub fn payload(&self, snapshot_path: &Path) -> AlertPayload {
        AlertPayload {
            event: INTRUDER_EVENT.to_string(),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            confidence: self.confidence,
            bbox: self.bbox.to_array(),
            snapshot_path: snapshot_path.display().to_string(),
        }
    }
}

/// JSON document sent to the backend collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub event: String,
    /// ISO-8601 local time
    pub timestamp: String,
    pub confidence: f64,
    pub bbox: [u32; 4],
    pub snapshot_path: String,
}
