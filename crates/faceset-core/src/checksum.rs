//! SHA-256 file digests.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{ManifestError, Result};

const CHUNK_SIZE: usize = 8192;

/// Lowercase hex SHA-256 of the file at `path`, streamed in 8 KiB chunks.
pub fn compute_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ManifestError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| ManifestError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checksum of `path`, or an empty string when it is absent or unreadable.
pub fn checksum_or_empty(path: &Path) -> String {
    if !path.is_file() {
        return String::new();
    }
    match compute_checksum(path) {
        Ok(sum) => sum,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "checksum failed; recording empty checksum");
            String::new()
        }
    }
}
