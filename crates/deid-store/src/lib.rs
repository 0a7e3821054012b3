//! Deid Store — mapping store, JSON snapshots and the SQLite snapshot vault.

pub mod mapping;
pub mod schema;
pub mod snapshot;
pub mod sqlite;

pub use mapping::MappingStore;
pub use snapshot::{JsonSnapshotFile, MappingSnapshot, SnapshotSink, SNAPSHOT_VERSION};
pub use sqlite::{SnapshotSummary, SnapshotVault};
