//! Face region detection.
//!
//! The detector is a capability behind [`RegionDetector`]; the only bundled
//! implementation is the OpenCV Haar cascade (feature `opencv`).

use crate::config::DetectorConfig;
use crate::vision::types::{FaceRect, VisionError};
use image::GrayImage;

/// Finds candidate face regions in an intensity image.
///
/// Coordinates are relative to the image passed in. Implementations are
/// used from the recognition thread only.
pub trait RegionDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceRect>, VisionError>;
}

/// Load the region detector configured for this build.
#[cfg(feature = "opencv")]
pub fn load_region_detector(
    config: &DetectorConfig,
) -> Result<Box<dyn RegionDetector>, VisionError> {
    Ok(Box::new(haar::HaarFaceDetector::load(config)?))
}

/// Load the region detector configured for this build.
#[cfg(not(feature = "opencv"))]
pub fn load_region_detector(
    _config: &DetectorConfig,
) -> Result<Box<dyn RegionDetector>, VisionError> {
    Err(VisionError::DetectorUnavailable(
        "built without the `opencv` feature".to_string(),
    ))
}

#[cfg(feature = "opencv")]
pub use haar::HaarFaceDetector;

#[cfg(feature = "opencv")]
mod haar {
    use super::*;
    use ::opencv::{
        core::{Mat, Rect, Size, Vector},
        objdetect,
        prelude::*,
    };

    /// Haar cascade frontal-face detector.
    pub struct HaarFaceDetector {
        cascade: objdetect::CascadeClassifier,
        scale_factor: f64,
        min_neighbors: i32,
    }

    impl HaarFaceDetector {
        pub fn load(config: &DetectorConfig) -> Result<Self, VisionError> {
            if !config.cascade_path.is_file() {
                return Err(VisionError::DetectorUnavailable(format!(
                    "cascade file not found: {}",
                    config.cascade_path.display()
                )));
            }
            let path = config.cascade_path.to_str().ok_or_else(|| {
                VisionError::DetectorUnavailable("cascade path is not valid UTF-8".to_string())
            })?;

            let cascade = objdetect::CascadeClassifier::new(path)
                .map_err(|e| VisionError::DetectorUnavailable(e.to_string()))?;
            if cascade
                .empty()
                .map_err(|e| VisionError::DetectorUnavailable(e.to_string()))?
            {
                return Err(VisionError::DetectorUnavailable(format!(
                    "cascade failed to load: {path}"
                )));
            }

            Ok(Self {
                cascade,
                scale_factor: config.scale_factor,
                min_neighbors: config.min_neighbors,
            })
        }
    }

    impl RegionDetector for HaarFaceDetector {
        fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceRect>, VisionError> {
            let detection = |e: ::opencv::Error| VisionError::Detection(e.to_string());

            let mat = Mat::new_rows_cols_with_data(
                gray.height() as i32,
                gray.width() as i32,
                gray.as_raw().as_slice(),
            )
            .map_err(detection)?
            .try_clone()
            .map_err(detection)?;

            let mut rects = Vector::<Rect>::new();
            self.cascade
                .detect_multi_scale(
                    &mat,
                    &mut rects,
                    self.scale_factor,
                    self.min_neighbors,
                    0,
                    Size::new(0, 0),
                    Size::new(0, 0),
                )
                .map_err(detection)?;

            Ok(rects
                .iter()
                .filter(|r| r.width > 0 && r.height > 0)
                .map(|r| {
                    FaceRect::new(
                        r.x.max(0) as u32,
                        r.y.max(0) as u32,
                        r.width as u32,
                        r.height as u32,
                    )
                })
                .collect())
        }
    }
}
