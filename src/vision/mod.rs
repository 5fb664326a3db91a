//! Face detection, owner classification and training.
//!
//! The [`RecognitionEngine`] pulls frames from the camera module, finds
//! face regions with a [`RegionDetector`] and classifies each crop with a
//! [`FaceClassifier`]. The bundled classifier is LBPH, trained from the
//! owner's enrollment images by [`train_owner_model`].

pub mod detector;
pub mod engine;
pub mod lbph;
pub mod training;
pub mod types;

pub use detector::{load_region_detector, RegionDetector};
pub use engine::{EngineSettings, RecognitionEngine};
pub use lbph::{FaceClassifier, LbphModel};
pub use training::{
    train_owner_model, LabelMap, ModelArtifacts, TrainingError, TrainingReport, TrainingRequest,
};
pub use types::{
    is_intruder, DetectionBatch, FaceLabel, FaceObservation, FaceRect, IntruderCrop, Prediction,
    VisionError, OWNER_LABEL,
};
