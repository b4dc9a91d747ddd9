use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use faceset_core::{Manifest, SplitReader};

/// Which split to sample, and how.
#[derive(Debug, Clone)]
pub struct SplitQuery<'a> {
    pub name: &'a str,
    pub processed_dir: &'a Path,
    pub sample_ratio: f64,
    pub seed: u64,
}

pub fn run(manifest_path: &Path, query: Option<SplitQuery<'_>>) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("cannot describe {}", manifest_path.display()))?;
    print!("{}", summary(&manifest));

    if let Some(query) = query {
        let reader = SplitReader::new(&manifest, query.processed_dir, query.name)
            .with_sample_ratio(query.sample_ratio, query.seed);
        let present = reader.iter().filter(|s| s.image_path.is_file()).count();
        println!(
            "split {}: {} samples ({present} present under {})",
            reader.split(),
            reader.len(),
            query.processed_dir.display()
        );
    }
    Ok(())
}

/// Version, counts and change-log length.
pub fn summary(manifest: &Manifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "version: {}", manifest.version);
    let _ = writeln!(out, "items: {}", manifest.items.len());
    for (name, ids) in manifest.splits.iter() {
        let _ = writeln!(out, "  {name}: {}", ids.len());
    }
    let _ = writeln!(out, "pairs: {}", manifest.pairs.len());
    if let Some(source) = manifest.meta.get("source").and_then(|v| v.as_str()) {
        let _ = writeln!(out, "source: {source}");
    }
    let _ = writeln!(out, "changelog entries: {}", manifest.changelog().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceset_core::{ManifestItem, PairRecord, SplitAssignment};
    use serde_json::json;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        let items = (1..=4)
            .map(|i| ManifestItem {
                id: format!("a_{i}"),
                path: format!("a/{i}.jpg"),
                checksum: String::new(),
            })
            .collect();
        let mut splits = SplitAssignment::new();
        splits.insert("train", vec!["a_1".into(), "a_2".into(), "a_3".into()]);
        splits.insert("val", vec!["a_4".into()]);
        let pairs = vec![PairRecord::Same {
            person: "a".into(),
            img1: "1".into(),
            img2: "2".into(),
        }];
        let mut m = Manifest::assemble("1.0.0", items, splits, pairs, "LFW", false, Default::default());
        m.bump_version("1.1.0", json!({"version": "1.1.0"}));
        m
    }

    #[test]
    fn test_summary_counts() {
        let text = summary(&manifest());
        assert!(text.starts_with("version: 1.1.0\n"));
        assert!(text.contains("items: 4\n"));
        assert!(text.contains("  train: 3\n"));
        assert!(text.contains("  val: 1\n"));
        assert!(text.contains("pairs: 1\n"));
        assert!(text.contains("source: LFW\n"));
        assert!(text.contains("changelog entries: 1\n"));
    }

    #[test]
    fn test_run_with_split_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        manifest().save(&path).unwrap();
        let query = SplitQuery {
            name: "train",
            processed_dir: dir.path(),
            sample_ratio: 0.5,
            seed: 42,
        };
        run(&path, Some(query)).unwrap();
        assert!(run(&dir.path().join("missing.json"), None).is_err());
    }
}
