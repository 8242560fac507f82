//! In-memory entry store with synchronized indices
//!
//! The entry map, insertion order, type index and embedding map live in one
//! [`StoreInner`] behind a single `RwLock`, so every mutation updates all of
//! them inside one critical section and readers never see a half-indexed entry.

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::embedding::VectorEngine;
use crate::entry::{value_text, EntryId, MemoryEntry, Metadata, NewEntry};
use crate::error::{MemoryError, Result};

#[derive(Default)]
struct StoreInner {
    /// Insertion order
    order: Vec<EntryId>,
    entries: HashMap<EntryId, MemoryEntry>,
    by_type: HashMap<String, Vec<EntryId>>,
    embeddings: HashMap<EntryId, Vec<f32>>,
}

impl StoreInner {
    fn iter(&self) -> impl Iterator<Item = &MemoryEntry> + '_ {
        self.order.iter().filter_map(move |id| self.entries.get(id))
    }

    fn collect_where(&self, pred: impl Fn(&MemoryEntry) -> bool) -> Vec<MemoryEntry> {
        self.iter().filter(|e| pred(e)).cloned().collect()
    }

    fn remove(&mut self, id: &EntryId) -> Option<MemoryEntry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|other| other != id);
        self.embeddings.remove(id);
        if let Some(bucket) = self.by_type.get_mut(&entry.entry_type) {
            bucket.retain(|other| other != id);
            if bucket.is_empty() {
                self.by_type.remove(&entry.entry_type);
            }
        }
        Some(entry)
    }
}

/// Entry store with id, type and embedding indices
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    engine: VectorEngine,
}

impl MemoryStore {
    /// Create an empty store with the given embedding engine
    pub fn new(engine: VectorEngine) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            engine,
        }
    }

    /// Validate and store a new entry, returning its id
    pub fn store(&self, new_entry: NewEntry) -> Result<EntryId> {
        let entry = new_entry.build()?;
        let id = entry.id;
        let vector = self.engine.embed(&entry.embedding_text());

        let mut inner = self.inner.write();
        inner.order.push(id);
        inner
            .by_type
            .entry(entry.entry_type.clone())
            .or_default()
            .push(id);
        inner.embeddings.insert(id, vector);
        log::debug!("Stored {} entry {}", entry.entry_type, id);
        inner.entries.insert(id, entry);

        Ok(id)
    }

    /// Get an entry by ID
    pub fn get_by_id(&self, id: &EntryId) -> Option<MemoryEntry> {
        self.inner.read().entries.get(id).cloned()
    }

    /// All entries of one type, in insertion order
    pub fn retrieve_by_type(&self, entry_type: &str) -> Vec<MemoryEntry> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(entry_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.entries.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace content and/or metadata in place
    ///
    /// Returns `Ok(false)` when the id is unknown. Id, type and timestamp
    /// never change; the embedding is recomputed.
    pub fn update(
        &self,
        id: &EntryId,
        content: Option<String>,
        metadata: Option<Metadata>,
    ) -> Result<bool> {
        if matches!(content.as_deref(), Some("")) {
            return Err(MemoryError::validation(
                "memory entry content cannot be empty",
            ));
        }

        let mut inner = self.inner.write();
        let Some(entry) = inner.entries.get_mut(id) else {
            return Ok(false);
        };
        if let Some(content) = content {
            entry.content = content;
        }
        if let Some(metadata) = metadata {
            entry.metadata = metadata;
        }
        let vector = self.engine.embed(&entry.embedding_text());
        inner.embeddings.insert(*id, vector);
        log::debug!("Updated entry {}", id);

        Ok(true)
    }

    /// Delete an entry from every index
    pub fn delete(&self, id: &EntryId) -> bool {
        let removed = self.inner.write().remove(id).is_some();
        if removed {
            log::debug!("Deleted entry {}", id);
        }
        removed
    }

    /// Remove all entries, or all entries of one type; returns the count removed
    pub fn clear(&self, entry_type: Option<&str>) -> usize {
        let mut inner = self.inner.write();
        let removed = match entry_type {
            None => {
                let count = inner.entries.len();
                *inner = StoreInner::default();
                count
            }
            Some(entry_type) => {
                let ids = inner.by_type.remove(entry_type).unwrap_or_default();
                for id in &ids {
                    inner.entries.remove(id);
                    inner.embeddings.remove(id);
                }
                inner.order.retain(|id| !ids.contains(id));
                ids.len()
            }
        };
        log::info!(
            "Cleared {} entries (type: {})",
            removed,
            entry_type.unwrap_or("all")
        );
        removed
    }

    /// Number of entries, optionally of one type
    pub fn count(&self, entry_type: Option<&str>) -> usize {
        let inner = self.inner.read();
        match entry_type {
            None => inner.entries.len(),
            Some(t) => inner.by_type.get(t).map_or(0, Vec::len),
        }
    }

    /// Regex search over content; an empty pattern matches nothing
    pub fn search_by_text(&self, pattern: &str, case_insensitive: bool) -> Result<Vec<MemoryEntry>> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(self.search_compiled(&regex))
    }

    /// Case-sensitive regex search over content
    pub fn search_by_regex(&self, pattern: &str) -> Result<Vec<MemoryEntry>> {
        self.search_by_text(pattern, false)
    }

    fn search_compiled(&self, regex: &Regex) -> Vec<MemoryEntry> {
        self.inner
            .read()
            .collect_where(|e| regex.is_match(&e.content))
    }

    /// Entries whose metadata value at `key` equals `value` exactly
    pub fn search_by_metadata(&self, key: &str, value: &Value) -> Vec<MemoryEntry> {
        self.inner
            .read()
            .collect_where(|e| e.metadata.get(key) == Some(value))
    }

    /// Entries whose stringified metadata value at `key` contains `needle`
    pub fn search_by_metadata_substring(&self, key: &str, needle: &str) -> Vec<MemoryEntry> {
        self.inner.read().collect_where(|e| {
            e.metadata
                .get(key)
                .is_some_and(|v| value_text(v).contains(needle))
        })
    }

    /// Top `top_n` entries by embedding similarity to `query`
    pub fn search_by_similarity(&self, query: &str, top_n: usize) -> Vec<MemoryEntry> {
        self.scored_similarity(query, top_n)
            .into_iter()
            .map(|(entry, _)| entry)
            .collect()
    }

    /// Like [`search_by_similarity`](Self::search_by_similarity) but keeps scores
    ///
    /// Only strictly positive scores are kept. Ties keep insertion order.
    pub fn scored_similarity(&self, query: &str, top_n: usize) -> Vec<(MemoryEntry, f32)> {
        if query.trim().is_empty() || top_n == 0 {
            return Vec::new();
        }
        let query_vector = self.engine.embed_query(query);

        let inner = self.inner.read();
        let mut results: Vec<(MemoryEntry, f32)> = inner
            .iter()
            .filter_map(|entry| {
                let vector = inner.embeddings.get(&entry.id)?;
                let score = self.engine.similarity(&query_vector, vector);
                (score > 0.0).then(|| (entry.clone(), score))
            })
            .collect();
        drop(inner);

        // sort_by is stable, so equal scores stay in insertion order
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_n);
        results
    }

    /// The `n` newest entries, newest first; equal timestamps keep insertion order
    pub fn get_last(&self, n: usize) -> Vec<MemoryEntry> {
        let mut entries: Vec<MemoryEntry> = self.inner.read().iter().cloned().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(n);
        entries
    }

    /// All entries in insertion order
    pub fn get_all(&self) -> Vec<MemoryEntry> {
        self.inner.read().iter().cloned().collect()
    }

    /// Entry count per type
    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        self.inner
            .read()
            .by_type
            .iter()
            .map(|(t, ids)| (t.clone(), ids.len()))
            .collect()
    }

    /// Get store statistics
    pub fn stats(&self) -> serde_json::Value {
        let by_type = self.counts_by_type();
        let total: usize = by_type.values().sum();

        serde_json::json!({
            "totalEntries": total,
            "byType": by_type,
            "embeddingDimension": self.engine.dimension(),
            "queryCacheSize": self.engine.cache_size(),
        })
    }

    /// Get the vector engine reference
    pub fn engine(&self) -> &VectorEngine {
        &self.engine
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(VectorEngine::default())
    }
}
