use std::path::Path;

use anyhow::{Context, Result};
use faceset_core::{validator, Manifest, ValidationReport};

/// Validate `manifest_path` against `processed_dir` and print the findings.
/// Returns whether validation passed.
pub fn run(manifest_path: &Path, processed_dir: &Path) -> Result<bool> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("cannot validate {}", manifest_path.display()))?;
    let report = validator::validate(&manifest, processed_dir);
    print!("{}", render(&report));
    Ok(report.passed())
}

/// Human-readable findings, one block per problem kind.
pub fn render(report: &ValidationReport) -> String {
    let mut out = String::new();
    if !report.missing.is_empty() {
        out.push_str("Missing files:\n");
        for id in &report.missing {
            out.push_str(&format!("  {id}\n"));
        }
    }
    if !report.mismatched.is_empty() {
        out.push_str("Checksum mismatches:\n");
        for id in &report.mismatched {
            out.push_str(&format!("  {id}\n"));
        }
    }
    if !report.splits_ok {
        out.push_str("Split validation failed: ids missing from items:\n");
        for id in &report.unknown_split_ids {
            out.push_str(&format!("  {id}\n"));
        }
    }
    if !report.overlapping_ids.is_empty() {
        out.push_str("Warning: ids listed in more than one split:\n");
        for (id, splits) in &report.overlapping_ids {
            out.push_str(&format!("  {id} ({})\n", splits.join(", ")));
        }
    }
    if report.passed() {
        out.push_str("Manifest validation PASSED\n");
    }
    out
}
