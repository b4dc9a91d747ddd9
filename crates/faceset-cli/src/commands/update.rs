use std::path::Path;

use anyhow::{bail, Result};
use chrono::{SecondsFormat, Utc};
use faceset_core::store;
use serde_json::{Map, Value};

/// Parse a `key=value` flag. Values that read as JSON keep their type;
/// anything else is stored as a string.
pub fn parse_field(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("field '{raw}' is not key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("field '{raw}' has an empty key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Change-log entry: `version`, `date`, optional `message`, then the extra
/// fields. Extra fields cannot replace `version` or `date`.
pub fn change_entry(
    version: &str,
    date: &str,
    message: Option<&str>,
    fields: Vec<(String, Value)>,
) -> Map<String, Value> {
    let mut change = Map::new();
    for (key, value) in fields {
        change.insert(key, value);
    }
    change.insert("version".into(), Value::String(version.to_string()));
    change.insert("date".into(), Value::String(date.to_string()));
    if let Some(message) = message {
        change.insert("message".into(), Value::String(message.to_string()));
    }
    change
}

pub fn run(manifest: &Path, version: &str, message: Option<&str>, fields: &[String]) -> Result<()> {
    let fields = fields.iter().map(|f| parse_field(f)).collect::<Result<Vec<_>>>()?;
    let date = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let change = change_entry(version, &date, message, fields);
    let updated = store::update_dataset(manifest, version, change)?;
    println!(
        "{} now at version {} ({} change-log entries)",
        manifest.display(),
        updated.version,
        updated.changelog().len()
    );
    Ok(())
}
