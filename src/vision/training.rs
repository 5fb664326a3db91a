//! One-shot owner training and the on-disk model artifacts.

use crate::config::Config;
use crate::vision::lbph::LbphModel;
use crate::vision::types::{VisionError, OWNER_LABEL};
use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File name of the classifier artifact.
pub const MODEL_FILE: &str = "lbph_model.bin";

/// File name of the label-map artifact.
pub const LABELS_FILE: &str = "labels.json";

/// Training failures. None of these leave a partial artifact behind.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("enrollment directory not found: {0}")]
    EnrollDirMissing(PathBuf),
    #[error("found {found} usable images in {dir}, need at least {required}")]
    NotEnoughImages {
        found: usize,
        required: usize,
        dir: PathBuf,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Vision(#[from] VisionError),
}

/// Numeric label to identity name, stored as JSON (`{"0": "owner"}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(BTreeMap<String, String>);

impl LabelMap {
    /// Map containing only the owner.
    pub fn owner(name: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(OWNER_LABEL.to_string(), name.to_string());
        Self(map)
    }

    pub fn name_of(&self, label: i32) -> Option<&str> {
        self.0.get(&label.to_string()).map(String::as_str)
    }

    /// Numeric label registered for `name`.
    pub fn label_for(&self, name: &str) -> Option<i32> {
        self.0
            .iter()
            .find(|(_, v)| v.as_str() == name)
            .and_then(|(k, _)| k.parse().ok())
    }

    pub fn load(path: &Path) -> Result<Self, VisionError> {
        if !path.is_file() {
            return Err(VisionError::ModelMissing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| VisionError::ModelInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), VisionError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| VisionError::ModelInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Paths of the classifier and label-map artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
}

impl ModelArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model_path: dir.join(MODEL_FILE),
            labels_path: dir.join(LABELS_FILE),
        }
    }

    /// Both artifacts are present.
    pub fn exist(&self) -> bool {
        self.model_path.is_file() && self.labels_path.is_file()
    }

    /// Load the classifier and label map.
    pub fn load(&self) -> Result<(LbphModel, LabelMap), VisionError> {
        let model = LbphModel::load(&self.model_path)?;
        let labels = LabelMap::load(&self.labels_path)?;
        Ok((model, labels))
    }
}

/// Inputs of a training run.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub enroll_dir: PathBuf,
    pub model_dir: PathBuf,
    pub owner_name: String,
    pub face_size: u32,
    pub min_images: usize,
}

impl TrainingRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enroll_dir: config.enroll_dir(),
            model_dir: config.model_dir(),
            owner_name: config.owner_name.clone(),
            face_size: config.recognition.face_size,
            min_images: config.recognition.min_enrollment_images,
        }
    }
}

/// Outcome of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub images_used: usize,
    pub images_skipped: usize,
    pub artifacts: ModelArtifacts,
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "png"))
            .unwrap_or(false)
}

/// Image files in the enrollment directory, sorted by path.
pub fn enrollment_files(dir: &Path) -> Result<Vec<PathBuf>, TrainingError> {
    if !dir.is_dir() {
        return Err(TrainingError::EnrollDirMissing(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Decode every enrollment image as a canonical grayscale face.
///
/// Returns the faces and the number of files that could not be decoded.
pub fn load_enrollment_images(
    dir: &Path,
    face_size: u32,
) -> Result<(Vec<GrayImage>, usize), TrainingError> {
    let mut faces = Vec::new();
    let mut skipped = 0;

    for path in enrollment_files(dir)? {
        match image::open(&path) {
            Ok(img) => {
                let gray = img.to_luma8();
                faces.push(imageops::resize(&gray, face_size, face_size, FilterType::Triangle));
            }
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                skipped += 1;
            }
        }
    }
    Ok((faces, skipped))
}

/// Fit the owner classifier and write both artifacts.
pub fn train_owner_model(request: &TrainingRequest) -> Result<TrainingReport, TrainingError> {
    let (faces, skipped) = load_enrollment_images(&request.enroll_dir, request.face_size)?;
    if faces.len() < request.min_images {
        return Err(TrainingError::NotEnoughImages {
            found: faces.len(),
            required: request.min_images,
            dir: request.enroll_dir.clone(),
        });
    }

    info!(
        "Training owner model '{}' from {} images",
        request.owner_name,
        faces.len()
    );
    let labels = vec![OWNER_LABEL; faces.len()];
    let model = LbphModel::train(&faces, &labels, request.face_size)?;

    std::fs::create_dir_all(&request.model_dir)?;
    let artifacts = ModelArtifacts::in_dir(&request.model_dir);
    write_artifacts(&model, &LabelMap::owner(&request.owner_name), &artifacts)?;

    Ok(TrainingReport {
        images_used: faces.len(),
        images_skipped: skipped,
        artifacts,
    })
}

/// Write to temp files first, then rename both into place.
fn write_artifacts(
    model: &LbphModel,
    labels: &LabelMap,
    artifacts: &ModelArtifacts,
) -> Result<(), TrainingError> {
    let model_tmp = artifacts.model_path.with_extension("bin.tmp");
    let labels_tmp = artifacts.labels_path.with_extension("json.tmp");

    let staged = model
        .save(&model_tmp)
        .and_then(|_| labels.save(&labels_tmp))
        .map_err(TrainingError::from)
        .and_then(|_| {
            std::fs::rename(&model_tmp, &artifacts.model_path)?;
            if let Err(e) = std::fs::rename(&labels_tmp, &artifacts.labels_path) {
                // The old label map no longer matches the new model.
                let _ = std::fs::remove_file(&artifacts.model_path);
                let _ = std::fs::remove_file(&artifacts.labels_path);
                return Err(e.into());
            }
            Ok(())
        });

    if staged.is_err() {
        let _ = std::fs::remove_file(&model_tmp);
        let _ = std::fs::remove_file(&labels_tmp);
    } else {
        debug!("Artifacts written to {}", artifacts.model_path.display());
    }
    staged
}
