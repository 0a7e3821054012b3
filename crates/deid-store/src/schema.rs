//! Snapshot vault schema SQL.

/// One row per document plus its mapping entries in first-sight order.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    source_document TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    created_at TEXT,
    saved_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS mapping_entries (
    source_document TEXT NOT NULL REFERENCES snapshots(source_document) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    pii_type TEXT NOT NULL,
    original_value TEXT NOT NULL,
    surrogate_value TEXT NOT NULL,
    occurrence_count INTEGER NOT NULL CHECK (occurrence_count >= 1),
    PRIMARY KEY (source_document, seq),
    UNIQUE (source_document, pii_type, original_value),
    UNIQUE (source_document, surrogate_value)
);

CREATE INDEX IF NOT EXISTS idx_entries_document ON mapping_entries(source_document);
"#;
