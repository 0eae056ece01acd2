//! SQLite schema for the document store.
//!
//! - `meta` holds a single row recording the schema version and creation time
//! - `docs` is the document index: one row per id pointing at the winner
//! - `revs` holds every revision record ever written, immutable apart from
//!   its `leaf` flag

/// Migration v1: index, revision records, metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

INSERT OR IGNORE INTO meta (id, schema_version) VALUES (1, 1);

CREATE TABLE IF NOT EXISTS docs (
    id TEXT PRIMARY KEY CHECK (length(id) BETWEEN 1 AND 40),
    rev TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS revs (
    id TEXT NOT NULL,
    rev TEXT NOT NULL,
    doc TEXT NOT NULL,
    leaf INTEGER NOT NULL DEFAULT 1 CHECK (leaf IN (0, 1)),
    deleted INTEGER NOT NULL DEFAULT 0 CHECK (deleted IN (0, 1)),
    PRIMARY KEY (id, rev)
);

CREATE INDEX IF NOT EXISTS idx_revs_leaf ON revs(id, leaf, deleted);
";

/// Indexes the store relies on for leaf lookups.
pub const REQUIRED_INDEXES: &[&str] = &["idx_revs_leaf"];
