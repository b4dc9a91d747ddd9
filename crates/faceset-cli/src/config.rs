//! `prepare-data` configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, the TOML config
//! file, `FACESET_*` environment variables, command-line flags.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use faceset_align::{ScrfdAligner, DEFAULT_CROP_SIZE};
use faceset_core::{Aligner, PassthroughAligner, SplitRatios};
use serde::Deserialize;

pub const DEFAULT_DATASET: &str = "ashishpatel26/lfw-dataset";
pub const DEFAULT_RAW_DIR: &str = "data/lfw/raw";
pub const DEFAULT_PROC_DIR: &str = "data/lfw/processed";
pub const DEFAULT_MANIFEST: &str = "data/lfw/manifest.json";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_SOURCE: &str = "LFW";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;
pub const DEFAULT_VAL_RATIO: f64 = 0.1;

/// Known aligner implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignerKind {
    /// Copy images unchanged.
    #[default]
    Passthrough,
    /// SCRFD detection + five-point alignment (needs det_10g.onnx).
    Scrfd,
}

impl AlignerKind {
    /// Construct the aligner this kind names.
    pub fn build(self, model_dir: &Path, crop_size: u32) -> Result<Box<dyn Aligner>> {
        match self {
            Self::Passthrough => Ok(Box::new(PassthroughAligner)),
            Self::Scrfd => {
                let aligner = ScrfdAligner::from_model_dir(model_dir, crop_size)
                    .with_context(|| format!("failed to load SCRFD model from {}", model_dir.display()))?;
                Ok(Box::new(aligner))
            }
        }
    }
}

impl FromStr for AlignerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "none" => Ok(Self::Passthrough),
            "scrfd" => Ok(Self::Scrfd),
            other => bail!("unknown aligner '{other}' (expected passthrough or scrfd)"),
        }
    }
}

impl fmt::Display for AlignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passthrough => "passthrough",
            Self::Scrfd => "scrfd",
        })
    }
}

/// One configuration layer; every key optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PrepareLayer {
    pub download: Option<bool>,
    pub dataset: Option<String>,
    pub raw_dir: Option<PathBuf>,
    pub proc_dir: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub pairs_dir: Option<PathBuf>,
    pub train_ratio: Option<f64>,
    pub val_ratio: Option<f64>,
    pub version: Option<String>,
    pub seed: Option<u64>,
    pub source: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub aligner: Option<AlignerKind>,
    pub model_dir: Option<PathBuf>,
    pub crop_size: Option<u32>,
}

impl PrepareLayer {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Read `FACESET_*` variables through `lookup`.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| -> Result<Option<f64>> {
            var(key)
                .map(|v| v.trim().parse().with_context(|| format!("{key} is not a number: {v}")))
                .transpose()
        };

        Ok(Self {
            download: var("FACESET_DOWNLOAD").map(|v| v != "0" && !v.eq_ignore_ascii_case("false")),
            dataset: var("FACESET_DATASET"),
            raw_dir: var("FACESET_RAW_DIR").map(PathBuf::from),
            proc_dir: var("FACESET_PROC_DIR").map(PathBuf::from),
            manifest: var("FACESET_MANIFEST").map(PathBuf::from),
            pairs_dir: var("FACESET_PAIRS_DIR").map(PathBuf::from),
            train_ratio: parsed("FACESET_TRAIN_RATIO")?,
            val_ratio: parsed("FACESET_VAL_RATIO")?,
            version: var("FACESET_VERSION"),
            seed: var("FACESET_SEED")
                .map(|v| v.trim().parse().with_context(|| format!("FACESET_SEED is not an integer: {v}")))
                .transpose()?,
            source: var("FACESET_SOURCE"),
            extensions: var("FACESET_EXTENSIONS")
                .map(|v| v.split(',').map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect()),
            aligner: var("FACESET_ALIGNER").map(|v| v.parse()).transpose()?,
            model_dir: var("FACESET_MODEL_DIR").map(PathBuf::from),
            crop_size: var("FACESET_CROP_SIZE")
                .map(|v| v.trim().parse().with_context(|| format!("FACESET_CROP_SIZE is not an integer: {v}")))
                .transpose()?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Values set in `top` win over values in `self`.
    pub fn overlay(self, top: PrepareLayer) -> Self {
        Self {
            download: top.download.or(self.download),
            dataset: top.dataset.or(self.dataset),
            raw_dir: top.raw_dir.or(self.raw_dir),
            proc_dir: top.proc_dir.or(self.proc_dir),
            manifest: top.manifest.or(self.manifest),
            pairs_dir: top.pairs_dir.or(self.pairs_dir),
            train_ratio: top.train_ratio.or(self.train_ratio),
            val_ratio: top.val_ratio.or(self.val_ratio),
            version: top.version.or(self.version),
            seed: top.seed.or(self.seed),
            source: top.source.or(self.source),
            extensions: top.extensions.or(self.extensions),
            aligner: top.aligner.or(self.aligner),
            model_dir: top.model_dir.or(self.model_dir),
            crop_size: top.crop_size.or(self.crop_size),
        }
    }
}

/// Fully resolved `prepare-data` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareConfig {
    pub download: bool,
    pub dataset: String,
    pub raw_dir: PathBuf,
    pub proc_dir: PathBuf,
    pub manifest: PathBuf,
    pub pairs_dir: PathBuf,
    pub ratios: SplitRatios,
    pub version: String,
    pub seed: Option<u64>,
    pub source: String,
    pub extensions: Vec<String>,
    pub aligner: AlignerKind,
    pub model_dir: PathBuf,
    pub crop_size: u32,
}

impl PrepareConfig {
    /// Apply defaults and check the split ratios.
    pub fn resolve(layer: PrepareLayer) -> Result<Self> {
        let raw_dir = layer.raw_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_RAW_DIR));
        let ratios = SplitRatios::new(
            layer.train_ratio.unwrap_or(DEFAULT_TRAIN_RATIO),
            layer.val_ratio.unwrap_or(DEFAULT_VAL_RATIO),
        )?;
        let extensions = layer
            .extensions
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| vec!["jpg".to_string()]);

        Ok(Self {
            download: layer.download.unwrap_or(false),
            dataset: layer.dataset.unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            pairs_dir: layer.pairs_dir.unwrap_or_else(|| raw_dir.clone()),
            raw_dir,
            proc_dir: layer.proc_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_DIR)),
            manifest: layer.manifest.unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST)),
            ratios,
            version: layer.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            seed: layer.seed,
            source: layer.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            extensions,
            aligner: layer.aligner.unwrap_or_default(),
            model_dir: layer.model_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            crop_size: layer.crop_size.unwrap_or(DEFAULT_CROP_SIZE),
        })
    }

    /// Load `path`, then apply the environment and `flags`.
    pub fn load(path: &Path, flags: PrepareLayer) -> Result<Self> {
        let layered = PrepareLayer::from_file(path)?
            .overlay(PrepareLayer::from_env()?)
            .overlay(flags);
        Self::resolve(layered)
    }
}
