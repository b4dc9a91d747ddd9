//! faceset-core — Dataset manifest engine.
//!
//! Builds a checksum-verified manifest from a raw face-image tree, assigns
//! train/val/test splits, parses verification pairs, persists the manifest
//! as canonical JSON and re-validates it against disk.

pub mod aligner;
pub mod builder;
pub mod checksum;
pub mod error;
pub mod pairs;
pub mod reader;
pub mod splits;
pub mod store;
pub mod types;
pub mod validator;

pub use aligner::{AlignError, Aligner, Alignment, PassthroughAligner};
pub use builder::{BuildOptions, BuildReport, BuiltItem, ManifestBuilder};
pub use error::{ManifestError, Result};
pub use reader::{Sample, SplitReader};
pub use splits::{assign_splits, SplitRatios};
pub use types::{AlignOutcome, Manifest, ManifestItem, PairRecord, SplitAssignment};
pub use validator::{ItemFindings, ValidationReport};
