//! Raw image tree → manifest items.
//!
//! Mirrors every image into the processed tree (aligned when the configured
//! aligner finds a face, copied otherwise) and checksums the stored file.
//! One bad image never aborts the batch.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::aligner::{Aligner, Alignment};
use crate::checksum::checksum_or_empty;
use crate::error::{ManifestError, Result};
use crate::types::{AlignOutcome, ManifestItem};

const DEFAULT_PROGRESS_EVERY: usize = 200;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// File extensions treated as images, compared case-insensitively.
    pub extensions: Vec<String>,
    /// Log progress every N images (0 disables).
    pub progress_every: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["jpg".to_string()],
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// A built item and the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltItem {
    pub item: ManifestItem,
    pub outcome: AlignOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Items in enumeration order.
    pub items: Vec<BuiltItem>,
}

impl BuildReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items that took `outcome`.
    pub fn count(&self, outcome: AlignOutcome) -> usize {
        self.items.iter().filter(|b| b.outcome == outcome).count()
    }

    /// Outcome name → count, for sidecars and summaries.
    pub fn outcome_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for built in &self.items {
            *counts.entry(built.outcome.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn into_items(self) -> Vec<ManifestItem> {
        self.items.into_iter().map(|b| b.item).collect()
    }
}

/// Builds manifest items from a raw image tree.
pub struct ManifestBuilder {
    aligner: Box<dyn Aligner>,
    options: BuildOptions,
}

impl ManifestBuilder {
    pub fn new(aligner: Box<dyn Aligner>) -> Self {
        Self {
            aligner,
            options: BuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn aligner_name(&self) -> &str {
        self.aligner.name()
    }

    /// Process every image under `raw_root` into `output_root`.
    pub fn build(&mut self, raw_root: &Path, output_root: &Path) -> Result<BuildReport> {
        if !raw_root.is_dir() {
            return Err(ManifestError::NotFound {
                path: raw_root.to_path_buf(),
            });
        }
        fs::create_dir_all(output_root).map_err(|e| ManifestError::io(output_root, e))?;

        let images = enumerate_images(raw_root, &self.options.extensions)?;
        let total = images.len();
        tracing::info!(
            raw = %raw_root.display(),
            processed = %output_root.display(),
            aligner = self.aligner.name(),
            total,
            "building manifest items"
        );

        let mut seen_ids = HashSet::with_capacity(total);
        let mut report = BuildReport {
            items: Vec::with_capacity(total),
        };

        for (idx, rel) in images.iter().enumerate() {
            let image = raw_root.join(rel);
            let target = output_root.join(rel);
            let (stored, outcome) = self.store_image(&image, &target, output_root);

            let checksum = checksum_or_empty(&stored);
            let path = relative_within(&stored, output_root).unwrap_or_else(|| rel.clone());
            let id = unique_id(item_id(rel), &mut seen_ids);

            report.items.push(BuiltItem {
                item: ManifestItem {
                    id,
                    path: to_posix(&path),
                    checksum,
                },
                outcome,
            });

            let done = idx + 1;
            if self.options.progress_every > 0 && done % self.options.progress_every == 0 {
                tracing::info!(
                    "processed {done}/{total} images ({:.1}%)",
                    done as f64 * 100.0 / total.max(1) as f64
                );
            }
        }

        tracing::info!(
            total,
            aligned = report.count(AlignOutcome::Aligned),
            fallback = report.count(AlignOutcome::CopiedFallback),
            unavailable = report.count(AlignOutcome::Unavailable),
            "finished alignment"
        );
        Ok(report)
    }

    /// Run the aligner for one image and normalise whatever it produced into
    /// `target`. Returns the stored path and which path was taken.
    fn store_image(&mut self, image: &Path, target: &Path, output_root: &Path) -> (PathBuf, AlignOutcome) {
        if let Some(parent) = target.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %err, "failed to create output directory");
            }
        }

        let declared = match self.aligner.detect_and_align(image, target) {
            Ok(Alignment::Aligned { path }) => path,
            Ok(Alignment::NotDetected) => {
                tracing::debug!(image = %image.display(), "no face detected; copying original");
                copy_file(image, target);
                return (target.to_path_buf(), AlignOutcome::CopiedFallback);
            }
            Ok(Alignment::Unavailable) => {
                copy_file(image, target);
                return (target.to_path_buf(), AlignOutcome::Unavailable);
            }
            Err(err) => {
                tracing::warn!(image = %image.display(), error = %err, "aligner failed; copying original");
                copy_file(image, target);
                return (target.to_path_buf(), AlignOutcome::CopiedFallback);
            }
        };

        let mut produced = declared;
        if produced.is_dir() {
            if is_within(&produced, output_root) {
                if let Err(err) = fs::remove_dir_all(&produced) {
                    tracing::warn!(path = %produced.display(), error = %err, "failed to remove directory output");
                }
            } else {
                tracing::warn!(path = %produced.display(), "aligner returned a directory outside the output root; ignoring it");
            }
            produced = target.to_path_buf();
        }

        if !produced.exists() {
            copy_file(image, target);
            return (target.to_path_buf(), AlignOutcome::CopiedFallback);
        }

        if !is_within(&produced, output_root) {
            copy_file(&produced, target);
            produced = target.to_path_buf();
        }

        (produced, AlignOutcome::Aligned)
    }
}

/// Every file under `root` whose extension is in `extensions`, as paths
/// relative to `root`, sorted lexicographically.
pub fn enumerate_images(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| ManifestError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            images.push(rel.to_path_buf());
        }
    }
    images.sort();
    Ok(images)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Item id: the relative path without its extension, separators replaced by `_`.
pub fn item_id(rel: &Path) -> String {
    let stem = rel.with_extension("");
    stem.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn unique_id(base: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if seen.insert(candidate.clone()) {
            tracing::warn!(id = %base, renamed = %candidate, "duplicate item id");
            return candidate;
        }
        n += 1;
    }
}

fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn copy_file(from: &Path, to: &Path) {
    if from == to {
        return;
    }
    if let Some(parent) = to.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Err(err) = fs::copy(from, to) {
        tracing::warn!(from = %from.display(), to = %to.display(), error = %err, "copy failed");
    }
}

fn is_within(path: &Path, root: &Path) -> bool {
    relative_within(path, root).is_some()
}

/// `path` relative to `root`, comparing canonical forms when the literal
/// prefix does not match.
fn relative_within(path: &Path, root: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }
    let path = path.canonicalize().ok()?;
    let root = root.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_item_id_nested() {
        assert_eq!(item_id(Path::new("Aaron_Eckhart/Aaron_Eckhart_0001.jpg")), "Aaron_Eckhart_Aaron_Eckhart_0001");
        assert_eq!(item_id(Path::new("a/b/c.d.jpg")), "a_b_c.d");
        assert_eq!(item_id(Path::new("solo.jpg")), "solo");
    }

    #[test]
    fn test_unique_id_suffixes_collisions() {
        let mut seen = HashSet::new();
        assert_eq!(unique_id("a_b".into(), &mut seen), "a_b");
        assert_eq!(unique_id("a_b".into(), &mut seen), "a_b_2");
        assert_eq!(unique_id("a_b".into(), &mut seen), "a_b_3");
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        let exts = vec!["jpg".to_string(), ".png".to_string()];
        assert!(has_extension(Path::new("x/a.JPG"), &exts));
        assert!(has_extension(Path::new("a.png"), &exts));
        assert!(!has_extension(Path::new("a.txt"), &exts));
        assert!(!has_extension(Path::new("noext"), &exts));
    }

    #[test]
    fn test_enumerate_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("b/2.jpg"), b"x").unwrap();
        fs::write(root.join("a/1.jpg"), b"x").unwrap();
        fs::write(root.join("a/notes.txt"), b"x").unwrap();
        fs::write(root.join("pairs.txt"), b"x").unwrap();

        let found = enumerate_images(root, &["jpg".to_string()]).unwrap();
        assert_eq!(found, vec![PathBuf::from("a/1.jpg"), PathBuf::from("b/2.jpg")]);
    }

    #[test]
    fn test_to_posix() {
        assert_eq!(to_posix(Path::new("a/b/c.jpg")), "a/b/c.jpg");
    }
}
