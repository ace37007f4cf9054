//! Resource resolution: client identifier -> upstream resource.

use std::sync::Arc;

use crate::catalog::{CatalogStore, VideoResource};
use crate::error::{ProxyError, Result};

/// Maps client-supplied identifiers to catalog entries.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn CatalogStore>,
}

impl Resolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Look up `identifier` with a single exact-match query.
    ///
    /// Fails with `MissingName` for an empty identifier, `NotFound` when the
    /// catalog has no entry, and `MissingUpstreamReference` when the entry
    /// exists but has no usable URL.
    pub fn resolve(&self, identifier: &str) -> Result<VideoResource> {
        if identifier.trim().is_empty() {
            return Err(ProxyError::MissingName);
        }

        let resource = self
            .store
            .find_by_identifier(identifier)
            .ok_or_else(|| ProxyError::NotFound(identifier.to_string()))?;

        if resource.upstream_url().is_none() {
            return Err(ProxyError::MissingUpstreamReference(identifier.to_string()));
        }

        Ok(resource)
    }
}
