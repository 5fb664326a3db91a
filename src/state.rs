//! Shared monitor state and outward telemetry.
//!
//! The recognition loop is the only writer. Readers poll at their own pace
//! and get a consistent copy of the whole composite; there is no change
//! notification, so a fast reader can see the same state twice.

use crate::core::ThreatState;
use crate::vision::{DetectionBatch, IntruderCrop};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Local};
use image::{ImageFormat, RgbImage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::warn;

/// Composite state published by the recognition loop.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Aggregated (vote-window) threat
    pub threat: bool,
    /// Smoothed rate of analysed frames per second
    pub fps: f64,
    /// Base64 JPEG of the intruder crop at the last rising edge
    pub latest_alert_image: Option<String>,
    /// Faces of the most recent sampled frame
    pub faces: DetectionBatch,
    /// Number of times `latest_alert_image` was replaced
    pub alert_image_updates: u64,
    /// Most recent intruder crop, for snapshotting
    pub last_intruder: Option<IntruderCrop>,
    pub updated_at: DateTime<Local>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            threat: false,
            fps: 0.0,
            latest_alert_image: None,
            faces: DetectionBatch::empty(0),
            alert_image_updates: 0,
            last_intruder: None,
            updated_at: Local::now(),
        }
    }
}

/// Everything the recognition loop learned from one sampled frame.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub batch: DetectionBatch,
    pub threat: bool,
    pub rising_edge: bool,
    pub fps: f64,
    pub last_intruder: Option<IntruderCrop>,
}

/// Outward telemetry document polled by a transport collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub threat: bool,
    pub fps: f64,
    pub image: Option<String>,
    pub faces: Vec<FaceTelemetry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceTelemetry {
    pub rect: [u32; 4],
    pub intruder: bool,
    pub confidence: f64,
}

/// Single-writer, multi-reader holder of [`SharedState`].
#[derive(Debug, Default)]
pub struct SharedStateStore {
    inner: RwLock<SharedState>,
    decision: RwLock<Option<ThreatState>>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the outcome of one sampled frame.
    ///
    /// The alert image is re-encoded only on a rising edge of the threat.
    pub fn publish(&self, update: FrameUpdate) {
        let alert_image = if update.rising_edge {
            update
                .last_intruder
                .as_ref()
                .and_then(|crop| match encode_jpeg_base64(&crop.image) {
                    Ok(encoded) => Some(encoded),
                    Err(e) => {
                        warn!("Could not encode alert image: {e}");
                        None
                    }
                })
        } else {
            None
        };

        let mut state = self.inner.write();
        state.threat = update.threat;
        state.fps = update.fps;
        state.faces = update.batch;
        state.last_intruder = update.last_intruder;
        state.updated_at = Local::now();
        if let Some(encoded) = alert_image {
            state.latest_alert_image = Some(encoded);
            state.alert_image_updates += 1;
        }
    }

    /// Record the control loop's view of the decision state.
    pub fn set_decision(&self, decision: ThreatState) {
        *self.decision.write() = Some(decision);
    }

    /// Last decision state recorded by the control loop.
    pub fn decision(&self) -> ThreatState {
        (*self.decision.read()).unwrap_or(ThreatState::Calm)
    }

    /// Consistent copy of the whole composite.
    pub fn snapshot(&self) -> SharedState {
        self.inner.read().clone()
    }

    pub fn threat(&self) -> bool {
        self.inner.read().threat
    }

    pub fn last_intruder(&self) -> Option<IntruderCrop> {
        self.inner.read().last_intruder.clone()
    }

    /// Threat flag and intruder crop read under one lock.
    pub fn threat_and_intruder(&self) -> (bool, Option<IntruderCrop>) {
        let state = self.inner.read();
        (state.threat, state.last_intruder.clone())
    }

    /// Outward telemetry document.
    pub fn telemetry(&self) -> Telemetry {
        let state = self.inner.read();
        Telemetry {
            threat: state.threat,
            fps: state.fps,
            image: state.latest_alert_image.clone(),
            faces: state
                .faces
                .faces
                .iter()
                .map(|f| FaceTelemetry {
                    rect: f.rect.to_array(),
                    intruder: f.is_intruder,
                    confidence: f.distance,
                })
                .collect(),
        }
    }
}

/// Encode an image as a base64 JPEG string.
pub fn encode_jpeg_base64(image: &RgbImage) -> Result<String, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
    Ok(STANDARD.encode(bytes))
}

/// Thread-safe shared state store.
pub type SharedStore = Arc<SharedStateStore>;

/// Create a new shared state store.
pub fn create_shared_store() -> SharedStore {
    Arc::new(SharedStateStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{FaceObservation, FaceRect, OWNER_LABEL};
    use image::Rgb;
    use std::thread;

    fn crop(value: u8) -> IntruderCrop {
        IntruderCrop {
            image: Arc::new(RgbImage::from_pixel(32, 32, Rgb([value, value, value]))),
            rect: FaceRect::new(1, 2, 32, 32),
            distance: 90.0,
            captured_at: Local::now(),
        }
    }

    fn update(threat: bool, rising_edge: bool, seq: u64) -> FrameUpdate {
        let mut batch = DetectionBatch::empty(seq);
        batch.faces.push(FaceObservation {
            rect: FaceRect::new(1, 2, 32, 32),
            predicted_label: OWNER_LABEL,
            distance: 90.0,
            is_intruder: true,
        });
        FrameUpdate {
            batch,
            threat,
            rising_edge,
            fps: 6.0,
            last_intruder: Some(crop(seq as u8)),
        }
    }

    #[test]
    fn test_image_updates_only_on_rising_edge() {
        let store = SharedStateStore::new();
        store.publish(update(false, false, 1));
        assert!(store.telemetry().image.is_none());

        store.publish(update(true, true, 2));
        let first = store.telemetry().image.unwrap();

        store.publish(update(true, false, 3));
        store.publish(update(true, false, 4));
        assert_eq!(store.telemetry().image.unwrap(), first);
        assert_eq!(store.snapshot().alert_image_updates, 1);

        // The crop itself tracks the latest frame.
        assert_eq!(store.last_intruder().unwrap().image.get_pixel(0, 0).0[0], 4);
    }

    #[test]
    fn test_telemetry_document() {
        let store = SharedStateStore::new();
        store.publish(update(true, true, 1));

        let json = serde_json::to_value(store.telemetry()).unwrap();
        assert_eq!(json["threat"], true);
        assert_eq!(json["fps"], 6.0);
        assert!(json["image"].is_string());
        assert_eq!(json["faces"][0]["rect"], serde_json::json!([1, 2, 32, 32]));
        assert_eq!(json["faces"][0]["intruder"], true);
        assert_eq!(json["faces"][0]["confidence"], 90.0);
    }

    #[test]
    fn test_base64_jpeg_decodes() {
        let encoded = encode_jpeg_base64(&RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]))).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), 16);
    }

    #[test]
    fn test_readers_see_consistent_composite() {
        let store = create_shared_store();
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 1..=300u64 {
                    store.publish(update(seq % 2 == 0, false, seq));
                }
            })
        };

        for _ in 0..300 {
            let state = store.snapshot();
            if let Some(crop) = &state.last_intruder {
                let seq = state.faces.frame_sequence;
                assert_eq!(crop.image.get_pixel(0, 0).0[0], seq as u8);
                assert_eq!(state.threat, seq % 2 == 0);
            }
        }
        writer.join().unwrap();
    }
}
