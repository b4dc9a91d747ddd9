//! Face alignment capability used by the manifest builder.
//!
//! The builder never probes for an aligner at runtime: one implementation is
//! chosen when the builder is constructed. [`PassthroughAligner`] stands in
//! when no detector is configured.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("aligner I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode or encode {path}: {message}")]
    Image { path: PathBuf, message: String },
    #[error("aligner model error: {0}")]
    Model(String),
    #[error("alignment failed: {0}")]
    Failed(String),
}

/// Answer from a single detect-and-align call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alignment {
    /// A face was aligned and written to `path`. Normally the requested
    /// output, but callers must not rely on that.
    Aligned { path: PathBuf },
    /// The detector ran but found no usable face.
    NotDetected,
    /// This aligner never detects; the caller copies the original.
    Unavailable,
}

/// Per-image face detection and alignment.
pub trait Aligner {
    /// Short name for logs and manifest metadata.
    fn name(&self) -> &str;

    /// Detect the dominant face in `image` and write an aligned crop to `output`.
    fn detect_and_align(&mut self, image: &Path, output: &Path) -> Result<Alignment, AlignError>;
}

/// Aligner that always reports [`Alignment::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAligner;

impl Aligner for PassthroughAligner {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn detect_and_align(&mut self, _image: &Path, _output: &Path) -> Result<Alignment, AlignError> {
        Ok(Alignment::Unavailable)
    }
}
