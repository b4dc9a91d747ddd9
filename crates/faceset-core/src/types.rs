use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One processed sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub id: String,
    /// Path relative to the processed root, `/`-separated.
    pub path: String,
    /// Lowercase hex SHA-256, or empty when the file was unavailable.
    #[serde(default)]
    pub checksum: String,
}

/// A verification pair parsed from a `pairs*.txt` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PairRecord {
    /// Two images of one identity.
    Same {
        person: String,
        img1: String,
        img2: String,
    },
    /// Images of two different identities.
    Diff {
        person1: String,
        img1: String,
        person2: String,
        img2: String,
    },
}

/// Split name → ordered item ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitAssignment(BTreeMap<String, Vec<String>>);

impl SplitAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ids: Vec<String>) {
        self.0.insert(name.into(), ids);
    }

    /// Ids of `name`, empty if the split is not defined.
    pub fn get(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Sum of split sizes, counting duplicates.
    pub fn total_len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Union of ids across every split.
    pub fn all_ids(&self) -> BTreeSet<&str> {
        self.0.values().flatten().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which path the builder took for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignOutcome {
    /// The aligner produced the stored file.
    Aligned,
    /// Detection failed or errored; the original image was copied.
    CopiedFallback,
    /// No aligner configured; the original image was copied.
    Unavailable,
}

impl AlignOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aligned => "aligned",
            Self::CopiedFallback => "copied_fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

/// The persisted dataset manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub items: Vec<ManifestItem>,
    #[serde(default)]
    pub splits: SplitAssignment,
    /// Id → checksum lookup index, redundant with `items`.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub pairs: Vec<PairRecord>,
}

impl Manifest {
    /// An empty manifest at `version`.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            items: Vec::new(),
            splits: SplitAssignment::new(),
            checksums: BTreeMap::new(),
            meta: Map::new(),
            pairs: Vec::new(),
        }
    }

    /// Assemble a manifest from built items and an assignment.
    ///
    /// Items are reordered to follow the split order (train, val, test, then
    /// any other split by name); items missing from every split keep their
    /// discovery order at the end. `meta` gets `source` and `aligned` before
    /// any extra entries, which may override them.
    pub fn assemble(
        version: impl Into<String>,
        items: Vec<ManifestItem>,
        splits: SplitAssignment,
        pairs: Vec<PairRecord>,
        source: &str,
        aligned: bool,
        extra_meta: Map<String, Value>,
    ) -> Self {
        let checksums = items
            .iter()
            .map(|item| (item.id.clone(), item.checksum.clone()))
            .collect();

        let mut by_id: BTreeMap<String, ManifestItem> = BTreeMap::new();
        let mut discovery = Vec::with_capacity(items.len());
        for item in items {
            discovery.push(item.id.clone());
            by_id.insert(item.id.clone(), item);
        }

        let mut ordered = Vec::with_capacity(by_id.len());
        for name in split_order(&splits) {
            for id in splits.get(name) {
                if let Some(item) = by_id.remove(id) {
                    ordered.push(item);
                }
            }
        }
        for id in discovery {
            if let Some(item) = by_id.remove(&id) {
                ordered.push(item);
            }
        }

        let mut meta = Map::new();
        meta.insert("source".into(), Value::String(source.to_string()));
        meta.insert("aligned".into(), Value::Bool(aligned));
        meta.extend(extra_meta);

        Self {
            version: version.into(),
            items: ordered,
            splits,
            checksums,
            meta,
            pairs,
        }
    }

    /// Ids of every item.
    pub fn item_ids(&self) -> BTreeSet<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }

    /// Look up an item by id.
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Entries of `meta.changelog`; empty when absent or not an array.
    pub fn changelog(&self) -> &[Value] {
        match self.meta.get("changelog") {
            Some(Value::Array(entries)) => entries,
            _ => &[],
        }
    }
}

/// The canonical split names first, then the rest in key order.
fn split_order(splits: &SplitAssignment) -> Vec<&str> {
    const CANONICAL: [&str; 3] = ["train", "val", "test"];
    let mut order: Vec<&str> = CANONICAL
        .iter()
        .copied()
        .filter(|name| splits.contains(name))
        .collect();
    order.extend(splits.names().filter(|name| !CANONICAL.contains(name)));
    order
}
