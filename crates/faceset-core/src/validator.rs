//! Re-verification of a manifest against the processed tree.
//!
//! Findings are collected, never raised: a missing file, a checksum drift
//! or a dangling split id each land in the [`ValidationReport`].

use std::collections::BTreeMap;
use std::path::{Component, Path};

use crate::checksum::compute_checksum;
use crate::types::Manifest;

/// Per-item findings, each recorded by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFindings {
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
    pub splits_ok: bool,
    /// Split ids with no matching item.
    pub unknown_split_ids: Vec<String>,
    /// Ids listed in more than one split, with the splits that list them.
    /// Reported only; does not fail validation.
    pub overlapping_ids: BTreeMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty() && self.splits_ok
    }
}

/// Check that every item exists under `root` and still matches its recorded
/// checksum. Missing files skip the checksum comparison; empty recorded
/// checksums are unverifiable and always pass.
pub fn validate_items(manifest: &Manifest, root: &Path) -> ItemFindings {
    let mut findings = ItemFindings::default();
    for item in &manifest.items {
        if !is_contained(&item.path) {
            tracing::warn!(path = %item.path, "item path escapes the processed root");
            findings.missing.push(item.path.clone());
            continue;
        }
        let full = root.join(&item.path);
        if !full.exists() {
            findings.missing.push(item.path.clone());
            continue;
        }
        let expected = manifest.checksums.get(&item.id).map(String::as_str).unwrap_or("");
        if expected.is_empty() {
            continue;
        }
        match compute_checksum(&full) {
            Ok(actual) if actual == expected => {}
            Ok(actual) => {
                tracing::debug!(path = %item.path, expected, actual = %actual, "checksum mismatch");
                findings.mismatched.push(item.path.clone());
            }
            Err(err) => {
                tracing::warn!(path = %item.path, error = %err, "failed to hash file");
                findings.mismatched.push(item.path.clone());
            }
        }
    }
    findings
}

/// Relative path made only of plain names: no root, prefix, `.` or `..`.
fn is_contained(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// True iff every id referenced by any split is a known item id.
pub fn validate_splits(manifest: &Manifest) -> bool {
    unknown_split_ids(manifest).is_empty()
}

/// Split ids that do not resolve to an item, deduplicated and sorted.
pub fn unknown_split_ids(manifest: &Manifest) -> Vec<String> {
    let known = manifest.item_ids();
    manifest
        .splits
        .all_ids()
        .into_iter()
        .filter(|id| !known.contains(id))
        .map(str::to_string)
        .collect()
}

/// Ids that appear in more than one split.
pub fn overlapping_split_ids(manifest: &Manifest) -> BTreeMap<String, Vec<String>> {
    let mut membership: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, ids) in manifest.splits.iter() {
        for id in ids {
            let splits = membership.entry(id.as_str()).or_default();
            if !splits.iter().any(|s| s == name) {
                splits.push(name.to_string());
            }
        }
    }
    membership
        .into_iter()
        .filter(|(_, splits)| splits.len() > 1)
        .map(|(id, splits)| (id.to_string(), splits))
        .collect()
}

/// Run every check.
pub fn validate(manifest: &Manifest, root: &Path) -> ValidationReport {
    let ItemFindings { missing, mismatched } = validate_items(manifest, root);
    let unknown_split_ids = unknown_split_ids(manifest);
    let report = ValidationReport {
        missing,
        mismatched,
        splits_ok: unknown_split_ids.is_empty(),
        unknown_split_ids,
        overlapping_ids: overlapping_split_ids(manifest),
    };
    tracing::info!(
        items = manifest.items.len(),
        missing = report.missing.len(),
        mismatched = report.mismatched.len(),
        unknown_split_ids = report.unknown_split_ids.len(),
        overlapping = report.overlapping_ids.len(),
        passed = report.passed(),
        "validated manifest"
    );
    report
}
