//! Canonical JSON persistence for [`Manifest`].
//!
//! Output is pretty-printed with a 2-space indent and every non-ASCII
//! character escaped as `\uXXXX`, so re-saving an unchanged manifest yields
//! identical bytes.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{ManifestError, Result};
use crate::types::Manifest;

const CHANGELOG_KEY: &str = "changelog";
const INITIAL_VERSION: &str = "0.0.0";

/// Pretty formatter that escapes everything outside ASCII.
struct AsciiPrettyFormatter<'a> {
    inner: PrettyFormatter<'a>,
}

impl<'a> AsciiPrettyFormatter<'a> {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b"  "),
        }
    }
}

impl Formatter for AsciiPrettyFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut utf16 = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut utf16) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize `value` as canonical ASCII-escaped pretty JSON.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiPrettyFormatter::new());
    value.serialize(&mut ser)?;
    // The formatter only emits ASCII.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `contents` to `path` through a temp file in the same directory that
/// is persisted over the target once fully written.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| ManifestError::io(parent, e))?;
    tmp.write_all(contents).map_err(|e| ManifestError::io(path, e))?;

    // Temp files are created 0600. Keep the target's mode, 0644 when new.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = match fs::metadata(path) {
            Ok(meta) => meta.permissions(),
            Err(_) => fs::Permissions::from_mode(0o644),
        };
        tmp.as_file()
            .set_permissions(perms)
            .map_err(|e| ManifestError::io(path, e))?;
    }

    tmp.as_file().sync_all().map_err(|e| ManifestError::io(path, e))?;
    tmp.persist(path).map_err(|e| ManifestError::io(path, e.error))?;
    Ok(())
}

impl Manifest {
    /// Canonical JSON form of this manifest.
    pub fn to_json(&self) -> Result<String> {
        to_canonical_string(self)
    }

    /// Parse a manifest document. `path` is only used for error reporting.
    pub fn from_json(text: &str, path: &Path) -> Result<Self> {
        let format_error = |message: String| ManifestError::Format {
            path: path.to_path_buf(),
            message,
        };
        let value: Value = serde_json::from_str(text).map_err(|e| format_error(e.to_string()))?;
        if !value.is_object() {
            return Err(format_error("document is not a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| format_error(e.to_string()))
    }

    /// Write the manifest to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())?;
        tracing::debug!(path = %path.display(), items = self.items.len(), "saved manifest");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| ManifestError::io(path, e))?;
        let text = std::str::from_utf8(&bytes).map_err(|e| ManifestError::Format {
            path: path.to_path_buf(),
            message: format!("not UTF-8: {e}"),
        })?;
        Self::from_json(text, path)
    }

    /// Replace the version and append `change` to `meta.changelog`.
    ///
    /// Pure in-memory mutation; call [`Manifest::save`] to persist.
    pub fn bump_version(&mut self, new_version: impl Into<String>, change: Value) {
        self.version = new_version.into();
        let entry = self
            .meta
            .entry(CHANGELOG_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            tracing::warn!("meta.changelog is not an array; replacing it");
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(log) = entry {
            log.push(change);
        }
    }
}

/// Load `path` (or start an empty manifest when absent), bump its version
/// with `change`, and save it back.
pub fn update_dataset(path: &Path, new_version: &str, change: Map<String, Value>) -> Result<Manifest> {
    let mut manifest = if path.exists() {
        Manifest::load(path)?
    } else {
        tracing::info!(path = %path.display(), "manifest absent; starting from an empty one");
        Manifest::new(INITIAL_VERSION)
    };
    let previous = manifest.version.clone();
    manifest.bump_version(new_version, Value::Object(change));
    manifest.save(path)?;
    tracing::info!(from = %previous, to = new_version, "bumped dataset version");
    Ok(manifest)
}
