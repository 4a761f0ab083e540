use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use image::RgbaImage;

use crate::cache::fingerprint::ContentFingerprint;
use crate::foundation::core::{CompositeKey, LayerIndex};

/// One cached composite.
///
/// Entries are immutable once stored; replacing a key swaps the whole entry.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    key: CompositeKey,
    image: Arc<RgbaImage>,
    created_at: SystemTime,
    last_used_at: Option<SystemTime>,
    lineage: Option<Vec<ContentFingerprint>>,
}

impl CacheEntry {
    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// `None` until the entry is first read through [`CompositeCache::lookup`].
    pub fn last_used_at(&self) -> Option<SystemTime> {
        self.last_used_at
    }

    /// Per-layer fingerprints of the content this composite was built from, aligned with
    /// `key().indices()`. Only recorded when fingerprint verification is enabled.
    pub fn lineage(&self) -> Option<&[ContentFingerprint]> {
        self.lineage.as_deref()
    }
}

/// Counters describing cache traffic since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub invalidated: u64,
}

/// Keyed store of previously computed composites.
///
/// Unbounded: nothing is evicted unless a caller invalidates it. Keys iterate in
/// lexicographic order so that cover selection is deterministic.
#[derive(Debug)]
pub struct CompositeCache {
    entries: BTreeMap<CompositeKey, CacheEntry>,
    record_usage: bool,
    stats: CacheStats,
}

impl Default for CompositeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeCache {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            record_usage: true,
            stats: CacheStats::default(),
        }
    }

    /// Disable or enable `last_used_at` bookkeeping on lookups.
    pub fn with_usage_recording(mut self, on: bool) -> Self {
        self.record_usage = on;
        self
    }

    /// Insert or overwrite the composite for `key`.
    pub fn store(&mut self, key: CompositeKey, image: Arc<RgbaImage>) {
        self.store_entry(key, image, None);
    }

    pub(crate) fn store_entry(
        &mut self,
        key: CompositeKey,
        image: Arc<RgbaImage>,
        lineage: Option<Vec<ContentFingerprint>>,
    ) {
        debug_assert!(lineage.as_ref().is_none_or(|l| l.len() == key.len()));
        tracing::trace!(%key, "cache store");
        self.stats.stores += 1;
        let entry = CacheEntry {
            key: key.clone(),
            image,
            created_at: SystemTime::now(),
            last_used_at: None,
            lineage,
        };
        self.entries.insert(key, entry);
    }

    /// Exact-match retrieval.
    pub fn lookup(&mut self, key: &CompositeKey) -> Option<Arc<RgbaImage>> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.stats.hits += 1;
                if self.record_usage {
                    entry.last_used_at = Some(SystemTime::now());
                }
                Some(Arc::clone(&entry.image))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Exact-match access that leaves usage and stats untouched.
    pub fn peek(&self, key: &CompositeKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &CompositeKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Every cached key whose element set includes `layer`.
    pub fn entries_containing(&self, layer: LayerIndex) -> impl Iterator<Item = &CompositeKey> {
        self.entries.keys().filter(move |k| k.contains(layer))
    }

    /// Drop every entry built from `layer`. Returns the number of entries removed.
    pub fn invalidate_layer(&mut self, layer: LayerIndex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.contains(layer));
        let removed = before - self.entries.len();
        self.stats.invalidated += removed as u64;
        if removed > 0 {
            tracing::debug!(%layer, removed, "invalidated cached composites");
        }
        removed
    }

    /// Rewrite every key through `f` after a structural edit of the stack.
    ///
    /// Entries with an index that `f` maps to `None`, or whose rewritten key is no longer
    /// strictly ascending, are dropped. Returns the number of entries dropped.
    pub fn remap(&mut self, mut f: impl FnMut(LayerIndex) -> Option<LayerIndex>) -> usize {
        let old = std::mem::take(&mut self.entries);
        let mut dropped = 0usize;
        for (key, mut entry) in old {
            let mapped: Option<Vec<LayerIndex>> = key.indices().iter().map(|&i| f(i)).collect();
            match mapped.and_then(|v| CompositeKey::new(v).ok()) {
                Some(new_key) => {
                    entry.key = new_key.clone();
                    self.entries.insert(new_key, entry);
                }
                None => dropped += 1,
            }
        }
        self.stats.invalidated += dropped as u64;
        if dropped > 0 {
            tracing::debug!(dropped, kept = self.entries.len(), "remapped cache keys");
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.stats.invalidated += self.entries.len() as u64;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.entries.keys()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
