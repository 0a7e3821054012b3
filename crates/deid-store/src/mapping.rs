//! In-memory bidirectional registry of (type, original) <-> surrogate.
//!
//! Entries are kept in insertion order so snapshots are reproducible;
//! two hash indexes give O(1) lookups in both directions.

use std::collections::HashMap;

use tracing::debug;

use crate::snapshot::{MappingSnapshot, SNAPSHOT_VERSION};
use deid_core::{Error, MappingEntry, PiiType, Result};

/// Mapping store for one document.
///
/// Not designed for concurrent writers: share it behind a mutex if more
/// than one thread must mutate it.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    source_document: String,
    entries: Vec<MappingEntry>,
    by_original: HashMap<(PiiType, String), usize>,
    by_surrogate: HashMap<String, usize>,
}

impl MappingStore {
    /// Create an empty store for `source_document`.
    pub fn new(source_document: impl Into<String>) -> Self {
        Self {
            source_document: source_document.into(),
            ..Default::default()
        }
    }

    pub fn source_document(&self) -> &str {
        &self.source_document
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion (first sight) order.
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn surrogates(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.surrogate_value.as_str())
    }

    pub fn lookup_surrogate(&self, pii_type: PiiType, original_value: &str) -> Option<&str> {
        self.by_original
            .get(&(pii_type, original_value.to_string()))
            .map(|&i| self.entries[i].surrogate_value.as_str())
    }

    pub fn lookup_original(&self, surrogate_value: &str) -> Option<(PiiType, &str)> {
        self.by_surrogate.get(surrogate_value).map(|&i| {
            let e = &self.entries[i];
            (e.pii_type, e.original_value.as_str())
        })
    }

    pub fn get(&self, pii_type: PiiType, original_value: &str) -> Option<&MappingEntry> {
        self.by_original
            .get(&(pii_type, original_value.to_string()))
            .map(|&i| &self.entries[i])
    }

    /// Register a new mapping with an occurrence count of 1.
    ///
    /// Re-inserting an identical mapping is a no-op. Any insert that would
    /// give a surrogate two owners, or an original two surrogates, fails
    /// with [`Error::Collision`] and leaves the store unchanged.
    pub fn insert(
        &mut self,
        pii_type: PiiType,
        original_value: &str,
        surrogate_value: &str,
    ) -> Result<()> {
        if original_value.is_empty() || surrogate_value.is_empty() {
            return Err(Error::Collision(format!(
                "{pii_type}: empty original or surrogate value"
            )));
        }

        let key = (pii_type, original_value.to_string());
        if let Some(&i) = self.by_original.get(&key) {
            if self.entries[i].surrogate_value == surrogate_value {
                return Ok(());
            }
            return Err(Error::Collision(format!(
                "{pii_type} original already mapped to {:?}, refusing {:?}",
                self.entries[i].surrogate_value, surrogate_value
            )));
        }
        if let Some(&i) = self.by_surrogate.get(surrogate_value) {
            let owner = &self.entries[i];
            return Err(Error::Collision(format!(
                "surrogate {:?} already owned by a {} entry",
                surrogate_value, owner.pii_type
            )));
        }

        let index = self.entries.len();
        self.entries.push(MappingEntry {
            pii_type,
            original_value: original_value.to_string(),
            surrogate_value: surrogate_value.to_string(),
            occurrence_count: 1,
        });
        self.by_original.insert(key, index);
        self.by_surrogate.insert(surrogate_value.to_string(), index);
        debug!("Mapped {} -> {:?}", pii_type, surrogate_value);
        Ok(())
    }

    /// Bump the occurrence count of an existing mapping. Returns the new count.
    pub fn increment_occurrence(&mut self, pii_type: PiiType, original_value: &str) -> Result<u64> {
        let i = *self
            .by_original
            .get(&(pii_type, original_value.to_string()))
            .ok_or_else(|| {
                Error::Internal(format!("no {pii_type} mapping to increment"))
            })?;
        let entry = &mut self.entries[i];
        entry.occurrence_count += 1;
        Ok(entry.occurrence_count)
    }

    /// Total substitutions recorded across all entries.
    pub fn total_occurrences(&self) -> u64 {
        self.entries.iter().map(|e| e.occurrence_count).sum()
    }

    /// Capture the durable form of this store.
    pub fn snapshot(&self) -> MappingSnapshot {
        MappingSnapshot {
            version: SNAPSHOT_VERSION,
            source_document: self.source_document.clone(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            entries: self.entries.clone(),
        }
    }

    /// Rebuild a store from a snapshot, validating every invariant.
    pub fn from_snapshot(snapshot: MappingSnapshot) -> Result<Self> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(Error::CorruptMapping(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut store = Self::new(snapshot.source_document);
        for (row, entry) in snapshot.entries.into_iter().enumerate() {
            if entry.original_value.is_empty() || entry.surrogate_value.is_empty() {
                return Err(Error::CorruptMapping(format!(
                    "entry {row}: empty original or surrogate value"
                )));
            }
            if entry.occurrence_count == 0 {
                return Err(Error::CorruptMapping(format!(
                    "entry {row}: occurrence_count must be >= 1"
                )));
            }
            let key = (entry.pii_type, entry.original_value.clone());
            if store.by_original.contains_key(&key) {
                return Err(Error::CorruptMapping(format!(
                    "entry {row}: duplicate {} original",
                    entry.pii_type
                )));
            }
            if store.by_surrogate.contains_key(&entry.surrogate_value) {
                return Err(Error::CorruptMapping(format!(
                    "entry {row}: surrogate {:?} shared by distinct originals",
                    entry.surrogate_value
                )));
            }
            let index = store.entries.len();
            store.by_original.insert(key, index);
            store.by_surrogate.insert(entry.surrogate_value.clone(), index);
            store.entries.push(entry);
        }
        Ok(store)
    }

    /// Serialize to the JSON snapshot format.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Parse and validate a JSON snapshot.
    ///
    /// Any structural problem, including missing fields, is reported as
    /// [`Error::CorruptMapping`].
    pub fn deserialize(raw: &str) -> Result<Self> {
        let snapshot: MappingSnapshot =
            serde_json::from_str(raw).map_err(|e| Error::CorruptMapping(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}
