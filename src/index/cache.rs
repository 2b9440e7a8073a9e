//! The Index Cache (spec §4.6): two maps and a rendered YAML buffer,
//! replaced as a single unit. Readers never see a torn cache; the writer
//! (the indexing worker) builds the replacement off to the side and swaps
//! an atomic pointer in, mirroring the "immutable value behind an atomic
//! pointer" guidance in spec.md §9.

use anyhow::{Context as _, Error};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The commit that produced one published (chart-name, version) binding
/// (spec §3's Commit Binding).
#[derive(Clone, Debug)]
pub struct CommitBinding {
    pub commit_id: String,
    pub commit_time: DateTime<Utc>,
    pub branch: String,
    pub digest: String,
    /// The chart directory name this binding was produced from, so a later
    /// request can re-read the same files without assuming the directory
    /// name matches the chart's declared `name` field.
    pub chart_dir: String,
}

/// One entry in the rendered `index.yaml`, matching the Helm Repository
/// Index v1 shape (spec §6).
#[derive(Clone, Debug, serde::Serialize)]
pub struct EntryRecord {
    pub name: String,
    pub version: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub urls: Vec<String>,
    pub digest: String,
}

#[derive(serde::Serialize)]
struct IndexDocument<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    generated: DateTime<Utc>,
    entries: &'a BTreeMap<String, Vec<EntryRecord>>,
}

/// One fully-built, immutable generation of the index.
pub struct IndexCache {
    pub generated: DateTime<Utc>,
    /// Chart name to its versions, newest first.
    pub entries: BTreeMap<String, Vec<EntryRecord>>,
    /// (chart-name, version) to the commit that produced it.
    pub bindings: HashMap<(String, String), CommitBinding>,
    /// The whole document, serialized once.
    pub rendered: String,
}

impl IndexCache {
    pub fn lookup(&self, name: &str, version: &str) -> Option<&CommitBinding> {
        self.bindings.get(&(name.to_owned(), version.to_owned()))
    }

    pub fn rendered_yaml(&self) -> &str {
        &self.rendered
    }

    /// An empty cache, used before the first successful build completes.
    pub fn empty() -> Self {
        Self {
            generated: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            entries: BTreeMap::new(),
            bindings: HashMap::new(),
            rendered: "apiVersion: v1\nentries: {}\n".to_owned(),
        }
    }
}

pub(super) fn render(
    entries: &BTreeMap<String, Vec<EntryRecord>>,
    generated: DateTime<Utc>,
) -> Result<String, Error> {
    let doc = IndexDocument {
        api_version: "v1",
        generated,
        entries,
    };
    serde_yaml::to_string(&doc).context("failed to render index.yaml")
}

/// The atomically-swappable handle the HTTP layer holds. A read acquires an
/// `Arc` to whichever generation is current and is unaffected by a
/// concurrent swap (spec §4.6, §5's "atomic swap" guarantee).
pub struct SharedCache(ArcSwap<IndexCache>);

impl SharedCache {
    pub fn new(initial: IndexCache) -> Self {
        Self(ArcSwap::from_pointee(initial))
    }

    pub fn load(&self) -> Arc<IndexCache> {
        self.0.load_full()
    }

    pub fn swap(&self, next: IndexCache) {
        self.0.store(Arc::new(next));
    }
}
