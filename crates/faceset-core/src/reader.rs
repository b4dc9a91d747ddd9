//! Read-only access to one split of a manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::types::Manifest;

pub const DEFAULT_SAMPLE_SEED: u64 = 42;

/// A resolved sample of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: String,
    /// Path relative to the processed root.
    pub path: String,
    /// `root / path`.
    pub image_path: PathBuf,
}

/// Items of a named split, in split order, optionally subsampled.
#[derive(Debug, Clone)]
pub struct SplitReader {
    split: String,
    samples: Vec<Sample>,
}

impl SplitReader {
    /// Resolve `split` against the manifest's items. Ids without an item are
    /// skipped; an undefined split yields no samples.
    pub fn new(manifest: &Manifest, root: &Path, split: &str) -> Self {
        let by_id: HashMap<&str, &str> = manifest
            .items
            .iter()
            .map(|item| (item.id.as_str(), item.path.as_str()))
            .collect();

        let samples = manifest
            .splits
            .get(split)
            .iter()
            .filter_map(|id| {
                by_id.get(id.as_str()).map(|path| Sample {
                    id: id.clone(),
                    path: path.to_string(),
                    image_path: root.join(path),
                })
            })
            .collect();

        Self {
            split: split.to_string(),
            samples,
        }
    }

    /// Keep a seeded random subset of `max(1, floor(len * ratio))` samples.
    ///
    /// The ratio is clamped into `[0, 1]`; a ratio of 1 keeps everything.
    pub fn with_sample_ratio(mut self, ratio: f64, seed: u64) -> Self {
        let ratio = if ratio.is_nan() { 1.0 } else { ratio.clamp(0.0, 1.0) };
        if ratio >= 1.0 || self.samples.is_empty() {
            return self;
        }
        let len = self.samples.len();
        let k = ((len as f64 * ratio).floor() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(seed);
        let picked = index::sample(&mut rng, len, k);
        self.samples = picked.iter().map(|i| self.samples[i].clone()).collect();
        self
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Sample> {
        self.samples.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}
