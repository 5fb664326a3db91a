//! Local Binary Patterns Histogram (LBPH) face classifier.
//!
//! Each canonical face crop is turned into a grid of LBP code histograms.
//! Prediction is nearest-neighbour over the training histograms using a
//! chi-square distance, so a lower distance means a closer match.

use crate::vision::types::{Prediction, VisionError};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grid cells per axis.
pub const GRID_SIZE: u32 = 8;

/// Histogram bins per cell (one per 8-bit LBP code).
const BINS: usize = 256;

/// Neighbour offsets, clockwise from the top-left.
const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// Classifies a canonical face crop against trained references.
pub trait FaceClassifier {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, VisionError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LbphSample {
    label: i32,
    histogram: Vec<f32>,
}

/// A trained LBPH model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbphModel {
    face_size: u32,
    grid: u32,
    samples: Vec<LbphSample>,
}

impl LbphModel {
    /// Fit a model from canonical face crops and their labels.
    ///
    /// All faces must be `face_size` × `face_size`.
    pub fn train(faces: &[GrayImage], labels: &[i32], face_size: u32) -> Result<Self, VisionError> {
        if faces.is_empty() {
            return Err(VisionError::Classification("no training faces".to_string()));
        }
        if faces.len() != labels.len() {
            return Err(VisionError::Classification(format!(
                "{} faces but {} labels",
                faces.len(),
                labels.len()
            )));
        }

        let samples = faces
            .iter()
            .zip(labels)
            .map(|(face, &label)| {
                check_size(face, face_size)?;
                Ok(LbphSample {
                    label,
                    histogram: spatial_histogram(&lbp_codes(face), GRID_SIZE),
                })
            })
            .collect::<Result<Vec<_>, VisionError>>()?;

        Ok(Self {
            face_size,
            grid: GRID_SIZE,
            samples,
        })
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Write the model as a bincode artifact.
    pub fn save(&self, path: &Path) -> Result<(), VisionError> {
        let bytes = bincode::serialize(self).map_err(|e| VisionError::ModelInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Read and validate a bincode artifact.
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        if !path.is_file() {
            return Err(VisionError::ModelMissing(path.to_path_buf()));
        }
        let invalid = |reason: String| VisionError::ModelInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path)?;
        let model: LbphModel = bincode::deserialize(&bytes).map_err(|e| invalid(e.to_string()))?;

        if model.samples.is_empty() {
            return Err(invalid("model has no samples".to_string()));
        }
        let expected = (model.grid * model.grid) as usize * BINS;
        if model.samples.iter().any(|s| s.histogram.len() != expected) {
            return Err(invalid("histogram size mismatch".to_string()));
        }
        Ok(model)
    }
}

impl FaceClassifier for LbphModel {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, VisionError> {
        check_size(face, self.face_size)?;
        let query = spatial_histogram(&lbp_codes(face), self.grid);

        self.samples
            .iter()
            .map(|s| Prediction {
                label: s.label,
                distance: chi_square(&s.histogram, &query),
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .ok_or_else(|| VisionError::Classification("model has no samples".to_string()))
    }
}

fn check_size(face: &GrayImage, face_size: u32) -> Result<(), VisionError> {
    if face.width() != face_size || face.height() != face_size {
        return Err(VisionError::Classification(format!(
            "expected {face_size}x{face_size} face, got {}x{}",
            face.width(),
            face.height()
        )));
    }
    Ok(())
}

/// LBP code image; one pixel smaller than the input on every side.
fn lbp_codes(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return GrayImage::new(0, 0);
    }

    GrayImage::from_fn(w - 2, h - 2, |x, y| {
        let cx = x as i32 + 1;
        let cy = y as i32 + 1;
        let center = img.get_pixel(cx as u32, cy as u32).0[0];
        let code = NEIGHBORS
            .iter()
            .enumerate()
            .fold(0u8, |code, (bit, (dx, dy))| {
                let p = img.get_pixel((cx + dx) as u32, (cy + dy) as u32).0[0];
                if p >= center {
                    code | (1 << bit)
                } else {
                    code
                }
            });
        image::Luma([code])
    })
}

/// Concatenated per-cell histograms, each normalised to sum to 1.
fn spatial_histogram(codes: &GrayImage, grid: u32) -> Vec<f32> {
    let mut out = vec![0.0f32; (grid * grid) as usize * BINS];
    let (w, h) = codes.dimensions();
    let cell_w = w / grid;
    let cell_h = h / grid;
    if cell_w == 0 || cell_h == 0 {
        return out;
    }

    for gy in 0..grid {
        for gx in 0..grid {
            let offset = ((gy * grid + gx) as usize) * BINS;
            let cell = &mut out[offset..offset + BINS];
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    cell[codes.get_pixel(x, y).0[0] as usize] += 1.0;
                }
            }
            let total = (cell_w * cell_h) as f32;
            cell.iter_mut().for_each(|v| *v /= total);
        }
    }
    out
}

/// Symmetric chi-square distance between two histograms.
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let sum = (x + y) as f64;
            if sum > f64::EPSILON {
                let diff = (x - y) as f64;
                2.0 * diff * diff / sum
            } else {
                0.0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient_face(size: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            Luma([((x * 3 + y + seed) % 256) as u8])
        })
    }

    fn checker_face(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            Luma([if (x / 4 + y / 4) % 2 == 0 { 30 } else { 220 }])
        })
    }

    #[test]
    fn test_identical_face_has_zero_distance() {
        let faces: Vec<_> = (0..3).map(|s| gradient_face(64, s)).collect();
        let model = LbphModel::train(&faces, &[0, 0, 0], 64).unwrap();

        let p = model.predict(&faces[1]).unwrap();
        assert_eq!(p.label, 0);
        assert!(p.distance.abs() < 1e-9);
    }

    #[test]
    fn test_different_texture_is_farther() {
        let faces: Vec<_> = (0..3).map(|s| gradient_face(64, s)).collect();
        let model = LbphModel::train(&faces, &[0, 0, 0], 64).unwrap();

        let near = model.predict(&gradient_face(64, 7)).unwrap();
        let far = model.predict(&checker_face(64)).unwrap();
        assert!(far.distance > near.distance);
    }

    #[test]
    fn test_nearest_label_wins() {
        let faces = vec![gradient_face(64, 0), checker_face(64)];
        let model = LbphModel::train(&faces, &[0, 1], 64).unwrap();

        assert_eq!(model.predict(&checker_face(64)).unwrap().label, 1);
        assert_eq!(model.predict(&gradient_face(64, 0)).unwrap().label, 0);
    }

    #[test]
    fn test_rejects_wrong_size() {
        let model = LbphModel::train(&[gradient_face(64, 0)], &[0], 64).unwrap();
        assert!(matches!(
            model.predict(&gradient_face(32, 0)),
            Err(VisionError::Classification(_))
        ));
        assert!(LbphModel::train(&[gradient_face(32, 0)], &[0], 64).is_err());
        assert!(LbphModel::train(&[], &[], 64).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("facewatch-lbph-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.bin");

        let model = LbphModel::train(&[gradient_face(64, 0)], &[0], 64).unwrap();
        model.save(&path).unwrap();
        let loaded = LbphModel::load(&path).unwrap();
        assert_eq!(loaded.sample_count(), 1);
        assert_eq!(loaded.face_size(), 64);

        std::fs::write(&path, b"not a model").unwrap();
        assert!(matches!(
            LbphModel::load(&path),
            Err(VisionError::ModelInvalid { .. })
        ));
        assert!(matches!(
            LbphModel::load(&dir.join("missing.bin")),
            Err(VisionError::ModelMissing(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
