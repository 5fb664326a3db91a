//! Per-frame recognition: decimate, detect, classify.

use crate::camera::Frame;
use crate::config::{Config, RecognitionConfig};
use crate::vision::detector::{load_region_detector, RegionDetector};
use crate::vision::lbph::FaceClassifier;
use crate::vision::training::ModelArtifacts;
use crate::vision::types::{
    is_intruder, DetectionBatch, FaceObservation, IntruderCrop, VisionError, OWNER_LABEL,
};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables of a recognition pass.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub process_every_n_frames: u32,
    pub downscale_factor: f32,
    pub min_face_area: u32,
    pub face_size: u32,
    pub intruder_distance_threshold: f64,
}

impl From<&RecognitionConfig> for EngineSettings {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            process_every_n_frames: config.process_every_n_frames.max(1),
            downscale_factor: config.downscale_factor,
            min_face_area: config.min_face_area,
            face_size: config.face_size,
            intruder_distance_threshold: config.intruder_distance_threshold,
        }
    }
}

/// Turns sampled frames into [`DetectionBatch`]es.
///
/// Lives on the recognition thread; neither the detector nor the classifier
/// needs to be `Send`.
pub struct RecognitionEngine {
    detector: Box<dyn RegionDetector>,
    classifier: Box<dyn FaceClassifier>,
    settings: EngineSettings,
    owner_label: i32,
    last_sequence: u64,
    new_frames: u64,
    last_intruder: Option<IntruderCrop>,
}

impl RecognitionEngine {
    pub fn new(
        detector: Box<dyn RegionDetector>,
        classifier: Box<dyn FaceClassifier>,
        settings: EngineSettings,
        owner_label: i32,
    ) -> Self {
        Self {
            detector,
            classifier,
            settings,
            owner_label,
            last_sequence: 0,
            new_frames: 0,
            last_intruder: None,
        }
    }

    /// Load the model artifacts and region detector named by `config`.
    ///
    /// Fails if either artifact is missing or invalid, or if no detector is
    /// available.
    pub fn from_config(config: &Config) -> Result<Self, VisionError> {
        let artifacts = ModelArtifacts::in_dir(&config.model_dir());
        let (model, labels) = artifacts.load()?;

        let owner_label = labels.label_for(&config.owner_name).unwrap_or_else(|| {
            warn!(
                "Owner '{}' not in label map, using label {OWNER_LABEL}",
                config.owner_name
            );
            OWNER_LABEL
        });

        let mut settings = EngineSettings::from(&config.recognition);
        if model.face_size() != settings.face_size {
            warn!(
                "Model was trained at {}px faces, overriding configured {}px",
                model.face_size(),
                settings.face_size
            );
            settings.face_size = model.face_size();
        }

        let detector = load_region_detector(&config.detector)?;
        info!(
            "Recognition engine ready ({} reference samples)",
            model.sample_count()
        );
        Ok(Self::new(detector, Box::new(model), settings, owner_label))
    }

    /// Feed the latest frame.
    ///
    /// Frames already seen are ignored. Of the new frames only every Nth is
    /// analysed; the others return `None`.
    pub fn process(&mut self, frame: &Frame) -> Option<DetectionBatch> {
        if frame.sequence <= self.last_sequence {
            return None;
        }
        self.last_sequence = frame.sequence;
        self.new_frames += 1;

        if self.new_frames % self.settings.process_every_n_frames as u64 != 0 {
            return None;
        }
        Some(self.analyze(frame))
    }

    /// Run one detection and classification pass.
    ///
    /// Errors yield an empty batch.
    pub fn analyze(&mut self, frame: &Frame) -> DetectionBatch {
        match self.try_analyze(frame) {
            Ok(batch) => batch,
            Err(e) => {
                debug!("Recognition pass on frame {} failed: {e}", frame.sequence);
                DetectionBatch::empty(frame.sequence)
            }
        }
    }

    /// Most recent intruder crop, if any intruder was ever seen.
    pub fn last_intruder(&self) -> Option<&IntruderCrop> {
        self.last_intruder.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn try_analyze(&mut self, frame: &Frame) -> Result<DetectionBatch, VisionError> {
        let (width, height) = (frame.width(), frame.height());
        let gray = imageops::grayscale(&frame.image);
        let small = self.downscale(&gray);

        let regions = self.detector.detect(&small)?;
        let mut batch = DetectionBatch::empty(frame.sequence);
        let mut candidate = None;
        let min_area = self.settings.min_face_area as u64;

        for region in regions {
            let rect = region.upscale(self.settings.downscale_factor);
            if rect.area() < min_area {
                continue;
            }
            let Some(rect) = rect.clamp_to(width, height) else {
                continue;
            };

            let face = imageops::crop_imm(&gray, rect.x, rect.y, rect.w, rect.h).to_image();
            let face = imageops::resize(
                &face,
                self.settings.face_size,
                self.settings.face_size,
                FilterType::Triangle,
            );
            let prediction = self.classifier.predict(&face)?;
            let intruder = is_intruder(
                &prediction,
                self.owner_label,
                self.settings.intruder_distance_threshold,
            );

            if intruder {
                let crop = imageops::crop_imm(&frame.image, rect.x, rect.y, rect.w, rect.h);
                candidate = Some(IntruderCrop {
                    image: Arc::new(crop.to_image()),
                    rect,
                    distance: prediction.distance,
                    captured_at: frame.captured_at,
                });
            }

            batch.faces.push(FaceObservation {
                rect,
                predicted_label: prediction.label,
                distance: prediction.distance,
                is_intruder: intruder,
            });
        }

        // Only a fully classified frame may replace the cached crop.
        if candidate.is_some() {
            self.last_intruder = candidate;
        }
        Ok(batch)
    }

    fn downscale(&self, gray: &GrayImage) -> GrayImage {
        let factor = self.settings.downscale_factor;
        if (factor - 1.0).abs() < f32::EPSILON {
            return gray.clone();
        }
        let w = ((gray.width() as f32 * factor).round() as u32).max(1);
        let h = ((gray.height() as f32 * factor).round() as u32).max(1);
        imageops::resize(gray, w, h, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::types::{FaceRect, Prediction};
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector(Result<Vec<FaceRect>, ()>);

    impl RegionDetector for FixedDetector {
        fn detect(&mut self, _gray: &GrayImage) -> Result<Vec<FaceRect>, VisionError> {
            self.0
                .clone()
                .map_err(|_| VisionError::Detection("boom".to_string()))
        }
    }

    struct FixedClassifier(Prediction);

    impl FaceClassifier for FixedClassifier {
        fn predict(&self, face: &GrayImage) -> Result<Prediction, VisionError> {
            assert_eq!(face.dimensions(), (200, 200));
            Ok(self.0)
        }
    }

    /// Reports an intruder for the first face, then fails.
    struct FailsOnSecond(AtomicUsize);

    impl FaceClassifier for FailsOnSecond {
        fn predict(&self, _face: &GrayImage) -> Result<Prediction, VisionError> {
            match self.0.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(STRANGER),
                _ => Err(VisionError::Detection("classifier failed".to_string())),
            }
        }
    }

    fn settings(every: u32) -> EngineSettings {
        EngineSettings::from(&RecognitionConfig {
            process_every_n_frames: every,
            ..RecognitionConfig::default()
        })
    }

    fn engine(rects: Vec<FaceRect>, prediction: Prediction, every: u32) -> RecognitionEngine {
        RecognitionEngine::new(
            Box::new(FixedDetector(Ok(rects))),
            Box::new(FixedClassifier(prediction)),
            settings(every),
            OWNER_LABEL,
        )
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(RgbImage::from_pixel(400, 300, Rgb([90, 120, 150])), sequence)
    }

    const OWNER: Prediction = Prediction { label: OWNER_LABEL, distance: 20.0 };
    const STRANGER: Prediction = Prediction { label: OWNER_LABEL, distance: 95.0 };

    #[test]
    fn test_small_regions_are_discarded() {
        // 39x39 at half scale is 78x78 = 6084 px, just under the minimum.
        let rects = vec![
            FaceRect::new(0, 0, 39, 39),
            FaceRect::new(60, 40, 40, 40),
            FaceRect::new(100, 80, 50, 50),
        ];
        let unknown = Prediction { label: OWNER_LABEL + 1, distance: 10.0 };

        for prediction in [STRANGER, OWNER, unknown] {
            let mut engine = engine(rects.clone(), prediction, 1);

            let batch = engine.process(&frame(1)).unwrap();
            assert_eq!(batch.faces.len(), 2, "{prediction:?}");
            assert_eq!(batch.faces[0].rect, FaceRect::new(120, 80, 80, 80));
            assert_eq!(batch.faces[1].rect, FaceRect::new(200, 160, 100, 100));
            if let Some(crop) = engine.last_intruder() {
                assert_ne!(crop.rect, FaceRect::new(0, 0, 78, 78));
            }
        }
    }

    #[test]
    fn test_every_nth_new_frame_is_sampled() {
        let mut engine = engine(vec![], OWNER, 5);

        let sampled: Vec<u64> = (1..=12)
            .filter(|&seq| engine.process(&frame(seq)).is_some())
            .collect();
        assert_eq!(sampled, vec![5, 10]);

        // Re-reading the same frame does not advance the counter.
        for _ in 0..10 {
            assert!(engine.process(&frame(12)).is_none());
        }
        assert!(engine.process(&frame(13)).is_none());
        assert!(engine.process(&frame(14)).is_none());
        assert!(engine.process(&frame(15)).is_some());
    }

    #[test]
    fn test_owner_face_is_not_cached() {
        let mut engine = engine(vec![FaceRect::new(50, 50, 60, 60)], OWNER, 1);
        let batch = engine.process(&frame(1)).unwrap();

        assert!(!batch.has_intruder());
        assert!(engine.last_intruder().is_none());
    }

    #[test]
    fn test_intruder_crop_is_cached_at_source_resolution() {
        let mut engine = engine(vec![FaceRect::new(50, 50, 60, 60)], STRANGER, 1);
        let batch = engine.process(&frame(1)).unwrap();

        assert!(batch.has_intruder());
        let crop = engine.last_intruder().unwrap();
        assert_eq!(crop.rect, FaceRect::new(100, 100, 120, 120));
        assert_eq!(crop.image.dimensions(), (120, 120));
        assert_eq!(crop.distance, 95.0);
    }

    #[test]
    fn test_regions_past_the_edge_are_clamped() {
        let mut engine = engine(vec![FaceRect::new(150, 100, 60, 60)], STRANGER, 1);
        let batch = engine.process(&frame(1)).unwrap();

        assert_eq!(batch.faces[0].rect, FaceRect::new(300, 200, 100, 100));
        assert_eq!(engine.last_intruder().unwrap().image.dimensions(), (100, 100));
    }

    #[test]
    fn test_detector_error_yields_empty_batch() {
        let mut engine = RecognitionEngine::new(
            Box::new(FixedDetector(Err(()))),
            Box::new(FixedClassifier(STRANGER)),
            settings(1),
            OWNER_LABEL,
        );
        let batch = engine.process(&frame(1)).unwrap();
        assert!(batch.faces.is_empty());
        assert_eq!(batch.frame_sequence, 1);
    }

    #[test]
    fn test_failed_frame_caches_no_crop() {
        let mut engine = RecognitionEngine::new(
            Box::new(FixedDetector(Ok(vec![
                FaceRect::new(10, 10, 50, 50),
                FaceRect::new(100, 80, 50, 50),
            ]))),
            Box::new(FailsOnSecond(AtomicUsize::new(0))),
            settings(1),
            OWNER_LABEL,
        );

        let batch = engine.process(&frame(1)).unwrap();
        assert!(batch.faces.is_empty());
        assert!(!batch.has_intruder());
        assert!(engine.last_intruder().is_none());
    }

    #[test]
    fn test_failed_frame_does_not_replace_cached_crop() {
        let mut engine = engine(vec![FaceRect::new(50, 50, 60, 60)], STRANGER, 1);
        engine.process(&frame(1)).unwrap();
        let cached = engine.last_intruder().unwrap().rect;

        engine.detector = Box::new(FixedDetector(Ok(vec![
            FaceRect::new(10, 10, 50, 50),
            FaceRect::new(100, 80, 50, 50),
        ])));
        engine.classifier = Box::new(FailsOnSecond(AtomicUsize::new(0)));

        let batch = engine.process(&frame(2)).unwrap();
        assert!(batch.faces.is_empty());
        assert_eq!(engine.last_intruder().unwrap().rect, cached);
    }
}
