//! Parser for `pairs*.txt` verification listings.
//!
//! A line with three tokens is a same-identity pair (`name img1 img2`), four
//! tokens a different-identity pair (`name1 img1 name2 img2`). Any other
//! token count, headers included, is dropped without error.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ManifestError, Result};
use crate::types::PairRecord;

const PAIRS_PREFIX: &str = "pairs";
const PAIRS_SUFFIX: &str = ".txt";

/// Parse one listing.
pub fn parse_pairs(text: &str) -> Vec<PairRecord> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<PairRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [person, img1, img2] => Some(PairRecord::Same {
            person: person.to_string(),
            img1: img1.to_string(),
            img2: img2.to_string(),
        }),
        [person1, img1, person2, img2] => Some(PairRecord::Diff {
            person1: person1.to_string(),
            img1: img1.to_string(),
            person2: person2.to_string(),
            img2: img2.to_string(),
        }),
        _ => None,
    }
}

/// `pairs*.txt` files directly inside `dir`, sorted by file name.
pub fn pair_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ManifestError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ManifestError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(PAIRS_PREFIX) && name.ends_with(PAIRS_SUFFIX) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every `pairs*.txt` in `dir`: files in name order, lines in order.
pub fn parse_pairs_dir(dir: &Path) -> Result<Vec<PairRecord>> {
    let files = pair_files(dir)?;
    let mut pairs = Vec::new();
    for file in &files {
        let text = fs::read_to_string(file).map_err(|e| ManifestError::io(file, e))?;
        let parsed = parse_pairs(&text);
        tracing::debug!(file = %file.display(), count = parsed.len(), "parsed pairs file");
        pairs.extend(parsed);
    }
    tracing::info!(files = files.len(), total = pairs.len(), "loaded pairs");
    Ok(pairs)
}
