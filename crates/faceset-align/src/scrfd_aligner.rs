//! [`Aligner`] backed by the SCRFD detector.

use std::path::Path;

use faceset_core::{AlignError, Aligner, Alignment};

use crate::alignment::align_face;
use crate::detector::{DetectorError, ScrfdDetector};

/// Default SCRFD model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

pub const DEFAULT_CROP_SIZE: u32 = 112;

/// Detects the most confident face and writes a five-point aligned crop.
pub struct ScrfdAligner {
    detector: ScrfdDetector,
    crop_size: u32,
}

impl ScrfdAligner {
    pub fn new(detector: ScrfdDetector, crop_size: u32) -> Self {
        Self {
            detector,
            crop_size: if crop_size == 0 { DEFAULT_CROP_SIZE } else { crop_size },
        }
    }

    /// Load `det_10g.onnx` from `model_dir`.
    pub fn from_model_dir(model_dir: &Path, crop_size: u32) -> Result<Self, DetectorError> {
        let detector = ScrfdDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        Ok(Self::new(detector, crop_size))
    }
}

impl Aligner for ScrfdAligner {
    fn name(&self) -> &str {
        "scrfd"
    }

    fn detect_and_align(&mut self, image: &Path, output: &Path) -> Result<Alignment, AlignError> {
        let rgb = image::open(image)
            .map_err(|e| AlignError::Image {
                path: image.to_path_buf(),
                message: e.to_string(),
            })?
            .to_rgb8();

        let faces = self.detector.detect(&rgb)?;
        let Some((face, landmarks)) = faces.iter().find_map(|f| f.landmarks.map(|lm| (f, lm))) else {
            return Ok(Alignment::NotDetected);
        };
        tracing::debug!(
            image = %image.display(),
            confidence = face.confidence,
            faces = faces.len(),
            "aligning best face"
        );

        let crop = align_face(&rgb, &landmarks, self.crop_size);
        crop.save(output).map_err(|e| AlignError::Image {
            path: output.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Alignment::Aligned {
            path: output.to_path_buf(),
        })
    }
}
