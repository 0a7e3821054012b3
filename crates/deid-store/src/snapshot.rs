//! Durable mapping snapshots.
//!
//! A snapshot is the only artifact needed to invert a de-identification
//! run, so writes go to a temporary file first and are renamed into place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::mapping::MappingStore;
use deid_core::{Error, MappingEntry, PiiType, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a [`MappingStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub version: u32,
    pub source_document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub entries: Vec<MappingEntry>,
}

impl MappingSnapshot {
    /// Import the label-grouped mapping format written by older tooling:
    /// `{"PERSON": {"<original>": "<surrogate>", ...}, ...}`.
    ///
    /// Labels are normalized like recognizer output and every entry gets
    /// an occurrence count of 1.
    pub fn from_legacy_json(source_document: &str, raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| Error::CorruptMapping(e.to_string()))?;
        let groups = value
            .as_object()
            .ok_or_else(|| Error::CorruptMapping("legacy mappings must be an object".into()))?;

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for (label, group) in groups {
            let pii_type = PiiType::from_label(label);
            let pairs = group.as_object().ok_or_else(|| {
                Error::CorruptMapping(format!("legacy group {label:?} must be an object"))
            })?;
            for (original, surrogate) in pairs {
                let surrogate = surrogate.as_str().ok_or_else(|| {
                    Error::CorruptMapping(format!("legacy group {label:?}: non-string surrogate"))
                })?;
                if !seen.insert(surrogate.to_string()) {
                    return Err(Error::CorruptMapping(format!(
                        "legacy surrogate {surrogate:?} shared by distinct originals"
                    )));
                }
                entries.push(MappingEntry {
                    pii_type,
                    original_value: original.clone(),
                    surrogate_value: surrogate.to_string(),
                    occurrence_count: 1,
                });
            }
        }

        Ok(Self {
            version: SNAPSHOT_VERSION,
            source_document: source_document.to_string(),
            created_at: None,
            entries,
        })
    }
}

/// Destination for the snapshot written when a run is finalized.
pub trait SnapshotSink {
    fn persist(&self, snapshot: &MappingSnapshot) -> Result<()>;
}

/// A snapshot stored as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the snapshot into a store.
    pub fn load(&self) -> Result<MappingStore> {
        let raw = std::fs::read_to_string(&self.path)?;
        let store = MappingStore::deserialize(&raw)?;
        info!(
            "Loaded {} mappings from {}",
            store.len(),
            self.path.display()
        );
        Ok(store)
    }

    /// Load a label-grouped legacy mapping file.
    pub fn load_legacy(&self, source_document: &str) -> Result<MappingStore> {
        let raw = std::fs::read_to_string(&self.path)?;
        MappingStore::from_snapshot(MappingSnapshot::from_legacy_json(source_document, &raw)?)
    }
}

impl SnapshotSink for JsonSnapshotFile {
    fn persist(&self, snapshot: &MappingSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(
            "Saved {} mappings to {}",
            snapshot.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}
