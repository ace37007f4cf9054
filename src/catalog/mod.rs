//! Video catalog
//!
//! The catalog maps client-facing identifiers to upstream resources. The
//! proxy only ever reads from it; entries are added at startup from a JSON
//! file and by listing synchronization.

pub mod sync;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ProxyError, Result};

/// Content type assumed when neither the catalog nor the upstream knows better.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

/// A remotely hosted video known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResource {
    /// Unique lookup key (the cleaned title for synchronized entries).
    #[serde(alias = "titulo")]
    pub identifier: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Upstream URL. May be missing in a damaged catalog.
    #[serde(default, alias = "url_video")]
    pub url: Option<String>,
    /// Best-effort total size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Best-effort MIME type.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// File id at the storage backend, used to de-duplicate synchronization.
    #[serde(default, alias = "drive_file_id")]
    pub source_id: Option<String>,
}

impl VideoResource {
    pub fn new(identifier: impl Into<String>, url: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            title: identifier.clone(),
            identifier,
            url: Some(url.into()),
            size: None,
            content_type: default_content_type(),
            source_id: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// The upstream URL, if it is present and looks fetchable.
    pub fn upstream_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
    }
}

/// Lookup interface the resolver depends on.
pub trait CatalogStore: Send + Sync {
    /// Exact-match lookup. Returns a snapshot of the entry.
    fn find_by_identifier(&self, identifier: &str) -> Option<VideoResource>;

    /// Number of entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory catalog, safe for concurrent readers and writers.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    /// identifier -> resource
    entries: DashMap<String, VideoResource>,
    /// source_id -> identifier
    by_source: DashMap<String, String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from resources. Later duplicates of an identifier
    /// are dropped.
    pub fn from_resources(resources: impl IntoIterator<Item = VideoResource>) -> Self {
        let catalog = Self::new();
        for resource in resources {
            if !catalog.insert(resource.clone()) {
                tracing::warn!("Duplicate catalog identifier '{}' ignored", resource.identifier);
            }
        }
        catalog
    }

    /// Load a catalog from a JSON file holding an array of resources.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut resources: Vec<VideoResource> = serde_json::from_str(&content)?;
        for resource in resources.iter_mut() {
            if resource.identifier.trim().is_empty() {
                return Err(ProxyError::Catalog(format!(
                    "entry with empty identifier in {}",
                    path.as_ref().display()
                )));
            }
            if resource.title.is_empty() {
                resource.title = resource.identifier.clone();
            }
        }
        Ok(Self::from_resources(resources))
    }

    /// Insert a resource. Returns false, leaving the catalog unchanged, if
    /// the identifier is already taken.
    pub fn insert(&self, resource: VideoResource) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(resource.identifier.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                if let Some(source_id) = &resource.source_id {
                    self.by_source
                        .insert(source_id.clone(), resource.identifier.clone());
                }
                slot.insert(resource);
                true
            }
        }
    }

    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn contains_source(&self, source_id: &str) -> bool {
        self.by_source.contains_key(source_id)
    }
}

impl CatalogStore for MemoryCatalog {
    fn find_by_identifier(&self, identifier: &str) -> Option<VideoResource> {
        self.entries.get(identifier).map(|r| r.value().clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
