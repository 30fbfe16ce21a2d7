//! resref mapper: resolve loose resource arguments (`po`, `deploy.apps`, `deployments.v1.apps`)
//! into REST mappings against the cluster's discovered catalog.

#![forbid(unsafe_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use metrics::counter;
use resref_core::{parse_resource_arg, DiscoveryRecord, Error, GroupVersionKind, RestMapping};
use resref_kubehub::{DiscoveryCache, DiscoverySource};
use tracing::{debug, info};

pub mod index;
pub mod render;

pub use index::{Ambiguity, CatalogIndex, Resolution};
pub use render::{line, object_reference, render, OutputFormat};

/// The index derived from one cache fill; built at most once.
struct IndexSlot {
    records: Arc<[DiscoveryRecord]>,
    index: OnceLock<Arc<CatalogIndex>>,
}

impl IndexSlot {
    fn serves(&self, records: &Arc<[DiscoveryRecord]>) -> bool {
        Arc::ptr_eq(&self.records, records)
    }
}

/// Orchestrates parsing, kind resolution and REST mapping over a cached catalog.
pub struct Mapper {
    cache: DiscoveryCache,
    slot: ArcSwapOption<IndexSlot>,
}

impl Mapper {
    pub fn new(cache: DiscoveryCache) -> Self {
        Self { cache, slot: ArcSwapOption::empty() }
    }

    pub fn from_source(source: Arc<dyn DiscoverySource>, timeout: Duration) -> Self {
        Self::new(DiscoveryCache::with_timeout(source, timeout))
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    /// The index over the current cache fill, built on first need.
    ///
    /// Callers racing on a cold index share one build.
    pub async fn index(&self) -> resref_core::Result<Arc<CatalogIndex>> {
        let records = self.cache.records().await?;
        let slot = self.slot_for(&records);
        let index = slot.index.get_or_init(|| {
            counter!("catalog_index_builds_total", 1u64);
            let index = CatalogIndex::new(Arc::clone(&slot.records));
            debug!(records = index.len(), "catalog index built");
            Arc::new(index)
        });
        Ok(Arc::clone(index))
    }

    /// The slot for this fill, installing an empty one if the stored slot serves an older fill.
    fn slot_for(&self, records: &Arc<[DiscoveryRecord]>) -> Arc<IndexSlot> {
        if let Some(slot) = self.slot.load_full() {
            if slot.serves(records) {
                return slot;
            }
        }
        let fresh = Arc::new(IndexSlot { records: Arc::clone(records), index: OnceLock::new() });
        let prev = self.slot.rcu(|cur| match cur {
            Some(slot) if slot.serves(records) => Some(Arc::clone(slot)),
            _ => Some(Arc::clone(&fresh)),
        });
        match prev {
            Some(slot) if slot.serves(records) => slot,
            _ => fresh,
        }
    }

    /// Forget the discovery fill and the index derived from it.
    pub fn invalidate(&self) {
        self.cache.invalidate();
        self.slot.store(None);
    }

    /// Resolve a resource argument to a kind.
    ///
    /// A fully-qualified `resource.version.group` is looked up exactly; when it
    /// misses, the `resource.group` reading is tried so multi-dot groups like
    /// `ingresses.networking.k8s.io` still resolve.
    pub async fn gvk_for(&self, resource: &str) -> Result<GroupVersionKind> {
        let index = self.index().await?;
        let (full, gr) = parse_resource_arg(resource);
        let Some(gvr) = full else {
            return index.kind_for(&gr.with_version("")).with_context(|| format!("kind for {}", gr));
        };
        match index.kind_for(&gvr) {
            Ok(gvk) => return Ok(gvk),
            Err(Error::NoResourceMatch { .. }) => {
                debug!(resource, fallback = %gr, "no exact version match; trying group/resource");
            }
            Err(e) => return Err(e).with_context(|| format!("kind for {}", gvr)),
        }
        match index.kind_for(&gr.with_version("")) {
            Err(Error::NoResourceMatch { .. }) => {
                let err = Error::NoResourceMatch { resource: resource.to_string() };
                Err(err).with_context(|| format!("kind for {}", gvr))
            }
            other => other.with_context(|| format!("kind for {}", gr)),
        }
    }

    /// Resolve `resource` to its REST mapping. `name` is not interpreted; it only labels errors.
    pub async fn mapping_for(&self, resource: &str, name: &str) -> Result<RestMapping> {
        counter!("resolve_total", 1u64);
        let gvk = self.gvk_for(resource).await.with_context(|| format!("gvk for '{} {}'", resource, name))?;
        let index = self.index().await?;
        let mapping = index.rest_mapping(&gvk.group_kind(), &gvk.version).context("rest mapping")?;
        info!(resource, name, gvk = %mapping.group_version_kind, plural = %mapping.resource.resource, "resolved");
        Ok(mapping)
    }
}
