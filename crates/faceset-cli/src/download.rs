//! Raw dataset acquisition through the `kaggle` command-line client.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

const KAGGLE_BIN: &str = "kaggle";

/// Directory name the LFW archive nests its person folders under.
const NESTED_ROOT: &str = "lfw";

/// Build the `kaggle datasets download` invocation for `dataset`.
pub fn kaggle_command(dataset: &str, out_dir: &Path) -> Command {
    let mut cmd = Command::new(KAGGLE_BIN);
    cmd.args(["datasets", "download", "-d", dataset, "-p"])
        .arg(out_dir)
        .arg("--unzip");
    cmd
}

/// Download `dataset` into `out_dir` and flatten the archive layout.
pub fn download_kaggle_dataset(dataset: &str, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    tracing::info!(dataset, out_dir = %out_dir.display(), "downloading dataset");
    let status = match kaggle_command(dataset, out_dir).status() {
        Ok(status) => status,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            bail!("'{KAGGLE_BIN}' not found on PATH; install the Kaggle CLI and configure credentials")
        }
        Err(e) => return Err(e).context("failed to launch kaggle"),
    };
    if !status.success() {
        bail!("kaggle download of '{dataset}' failed ({status})");
    }

    let moved = normalize_structure(out_dir)?;
    tracing::info!(moved, "download complete");
    Ok(())
}

/// When the archive unpacks into a nested `lfw` directory, copy every JPEG
/// below it up to `root/<file name>`. Existing files are left alone.
/// Returns the number copied.
pub fn normalize_structure(root: &Path) -> Result<usize> {
    let mut copied = 0;
    for nested in nested_roots(root)? {
        tracing::debug!(nested = %nested.display(), "normalizing nested dataset layout");
        for entry in WalkDir::new(&nested).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", nested.display()))?;
            if !entry.file_type().is_file() || !is_jpeg(entry.path()) {
                continue;
            }
            let target = root.join(entry.file_name());
            if target.exists() {
                continue;
            }
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Immediate subdirectories of `root` named `lfw`, any case.
fn nested_roots(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = std::fs::read_dir(root).with_context(|| format!("failed to list {}", root.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", root.display()))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir && entry.file_name().to_string_lossy().eq_ignore_ascii_case(NESTED_ROOT) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_kaggle_command_args() {
        let cmd = kaggle_command("owner/lfw", Path::new("/tmp/raw"));
        assert_eq!(cmd.get_program(), KAGGLE_BIN);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["datasets", "download", "-d", "owner/lfw", "-p", "/tmp/raw", "--unzip"]);
    }

    #[test]
    fn test_normalize_copies_nested_images_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("LFW/Alice");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Alice_0001.jpg"), b"a").unwrap();
        fs::write(nested.join("Alice_0002.JPG"), b"b").unwrap();
        fs::write(nested.join("notes.txt"), b"skip").unwrap();

        assert_eq!(normalize_structure(dir.path()).unwrap(), 2);
        assert_eq!(fs::read(dir.path().join("Alice_0001.jpg")).unwrap(), b"a");
        assert!(!dir.path().join("notes.txt").exists());

        // Second pass finds everything in place.
        assert_eq!(normalize_structure(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_normalize_keeps_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("lfw/Bob")).unwrap();
        fs::write(dir.path().join("lfw/Bob/Bob_0001.jpg"), b"nested").unwrap();
        fs::write(dir.path().join("Bob_0001.jpg"), b"top").unwrap();

        assert_eq!(normalize_structure(dir.path()).unwrap(), 0);
        assert_eq!(fs::read(dir.path().join("Bob_0001.jpg")).unwrap(), b"top");
    }

    #[test]
    fn test_normalize_flat_layout_is_noop() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Alice")).unwrap();
        fs::write(dir.path().join("Alice/Alice_0001.jpg"), b"a").unwrap();
        assert_eq!(normalize_structure(dir.path()).unwrap(), 0);
    }
}
