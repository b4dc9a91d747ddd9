//! `prepare-data`: download, build, split, pair, save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use faceset_core::{
    assign_splits, pairs, store, BuildOptions, Manifest, ManifestBuilder, ManifestError,
    PairRecord,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{AlignerKind, PrepareConfig};
use crate::download;

pub const SIDECAR_FILE: &str = "prepare.meta.json";

/// Counts from a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrepareSummary {
    pub items: usize,
    pub outcomes: BTreeMap<String, usize>,
    pub splits: BTreeMap<String, usize>,
    pub pairs: usize,
}

/// Contents of `prepare.meta.json`.
#[derive(Debug, Clone, Serialize)]
struct PrepareMeta<'a> {
    status: &'static str,
    error: Option<String>,
    manifest: String,
    version: &'a str,
    aligner: String,
    seed: Option<u64>,
    #[serde(flatten)]
    counts: PrepareSummary,
}

/// Sidecar location: next to the manifest.
pub fn sidecar_path(manifest: &Path) -> PathBuf {
    manifest.with_file_name(SIDECAR_FILE)
}

/// Run the pipeline and record the outcome in the sidecar, success or not.
/// The manifest is written once, after every other step succeeded.
pub fn run(config: &PrepareConfig) -> Result<PrepareSummary> {
    let result = prepare(config);

    let (status, error, counts) = match &result {
        Ok(summary) => ("built", None, summary.clone()),
        Err(err) => ("failed", Some(format!("{err:#}")), PrepareSummary::default()),
    };
    let meta = PrepareMeta {
        status,
        error,
        manifest: config.manifest.display().to_string(),
        version: &config.version,
        aligner: config.aligner.to_string(),
        seed: config.seed,
        counts,
    };
    let sidecar = sidecar_path(&config.manifest);
    if let Err(err) = write_sidecar(&sidecar, &meta) {
        tracing::warn!(path = %sidecar.display(), error = %err, "failed to write prepare sidecar");
    }

    result
}

fn write_sidecar(path: &Path, meta: &PrepareMeta<'_>) -> faceset_core::Result<()> {
    let json = store::to_canonical_string(meta)?;
    store::write_atomic(path, json.as_bytes())
}

fn prepare(config: &PrepareConfig) -> Result<PrepareSummary> {
    if config.download {
        download::download_kaggle_dataset(&config.dataset, &config.raw_dir)?;
    }

    let aligner = config.aligner.build(&config.model_dir, config.crop_size)?;
    let mut builder = ManifestBuilder::new(aligner).with_options(BuildOptions {
        extensions: config.extensions.clone(),
        ..Default::default()
    });
    let aligner_name = builder.aligner_name().to_string();
    let report = builder
        .build(&config.raw_dir, &config.proc_dir)
        .with_context(|| format!("failed to build dataset from {}", config.raw_dir.display()))?;
    let outcomes = report
        .outcome_counts()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let items = report.into_items();

    let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let splits = assign_splits(&ids, config.ratios, &mut rng);

    let pairs = load_pairs(&config.pairs_dir)?;

    let mut extra = Map::new();
    extra.insert("aligner".into(), Value::String(aligner_name));
    if let Some(seed) = config.seed {
        extra.insert("seed".into(), Value::from(seed));
    }

    let summary = PrepareSummary {
        items: items.len(),
        outcomes,
        splits: splits.iter().map(|(name, ids)| (name.to_string(), ids.len())).collect(),
        pairs: pairs.len(),
    };

    let manifest = Manifest::assemble(
        config.version.clone(),
        items,
        splits,
        pairs,
        &config.source,
        config.aligner != AlignerKind::Passthrough,
        extra,
    );
    manifest
        .save(&config.manifest)
        .with_context(|| format!("failed to save {}", config.manifest.display()))?;

    tracing::info!(
        manifest = %config.manifest.display(),
        items = summary.items,
        pairs = summary.pairs,
        "dataset prepared"
    );
    Ok(summary)
}

/// A missing pairs directory is not fatal; the manifest gets no pairs.
fn load_pairs(dir: &Path) -> Result<Vec<PairRecord>> {
    match pairs::parse_pairs_dir(dir) {
        Ok(pairs) => Ok(pairs),
        Err(ManifestError::NotFound { path }) => {
            tracing::warn!(path = %path.display(), "pairs directory not found; continuing without pairs");
            Ok(Vec::new())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read pairs from {}", dir.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrepareLayer;
    use faceset_core::validator;
    use std::fs;
    use tempfile::TempDir;

    fn raw_tree(root: &Path) {
        for person in ["Alice", "Bob"] {
            fs::create_dir_all(root.join(person)).unwrap();
            for i in 1..=5 {
                fs::write(root.join(format!("{person}/{person}_{i:04}.jpg")), format!("{person}{i}")).unwrap();
            }
        }
        fs::write(root.join("pairs.txt"), "2\nAlice 1 2\nAlice 1 Bob 3\n").unwrap();
    }

    fn config(dir: &TempDir) -> PrepareConfig {
        let layer = PrepareLayer {
            raw_dir: Some(dir.path().join("raw")),
            proc_dir: Some(dir.path().join("processed")),
            manifest: Some(dir.path().join("out/manifest.json")),
            seed: Some(7),
            ..Default::default()
        };
        PrepareConfig::resolve(layer).unwrap()
    }

    #[test]
    fn test_prepare_builds_manifest_and_sidecar() {
        let dir = TempDir::new().unwrap();
        raw_tree(&dir.path().join("raw"));
        let config = config(&dir);

        let summary = run(&config).unwrap();
        assert_eq!(summary.items, 10);
        assert_eq!(summary.pairs, 2);
        assert_eq!(summary.splits["train"], 8);
        assert_eq!(summary.splits["val"], 1);
        assert_eq!(summary.splits["test"], 1);
        assert_eq!(summary.outcomes["unavailable"], 10);

        let manifest = Manifest::load(&config.manifest).unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.meta["source"], "LFW");
        assert_eq!(manifest.meta["aligned"], false);
        assert_eq!(manifest.meta["aligner"], "passthrough");
        assert!(validator::validate(&manifest, &config.proc_dir).passed());

        let meta: Value =
            serde_json::from_str(&fs::read_to_string(sidecar_path(&config.manifest)).unwrap()).unwrap();
        assert_eq!(meta["status"], "built");
        assert_eq!(meta["error"], Value::Null);
        assert_eq!(meta["items"], 10);
    }

    #[test]
    fn test_same_seed_same_splits() {
        let dir = TempDir::new().unwrap();
        raw_tree(&dir.path().join("raw"));
        let config = config(&dir);

        run(&config).unwrap();
        let first = Manifest::load(&config.manifest).unwrap();
        run(&config).unwrap();
        let second = Manifest::load(&config.manifest).unwrap();
        assert_eq!(first.splits, second.splits);
    }

    #[test]
    fn test_missing_pairs_dir_yields_no_pairs() {
        let dir = TempDir::new().unwrap();
        raw_tree(&dir.path().join("raw"));
        let mut config = config(&dir);
        config.pairs_dir = dir.path().join("no-pairs-here");

        let summary = run(&config).unwrap();
        assert_eq!(summary.pairs, 0);
        assert!(Manifest::load(&config.manifest).unwrap().pairs.is_empty());
    }

    #[test]
    fn test_failure_recorded_without_manifest() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        assert!(run(&config).is_err());
        assert!(!config.manifest.exists());

        let meta: Value =
            serde_json::from_str(&fs::read_to_string(sidecar_path(&config.manifest)).unwrap()).unwrap();
        assert_eq!(meta["status"], "failed");
        assert!(meta["error"].as_str().unwrap().contains("raw"));
        assert_eq!(meta["items"], 0);
    }
}
