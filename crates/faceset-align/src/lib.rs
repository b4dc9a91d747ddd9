//! faceset-align — Face alignment for dataset preprocessing.
//!
//! Detects faces with SCRFD via ONNX Runtime and warps the most confident
//! one onto the ArcFace five-point template before it enters the manifest.

pub mod alignment;
pub mod detector;
pub mod scrfd_aligner;

pub use detector::{DetectorError, FaceBox, ScrfdDetector};
pub use scrfd_aligner::{ScrfdAligner, DEFAULT_CROP_SIZE, SCRFD_MODEL_FILE};
