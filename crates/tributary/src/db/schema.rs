//! Database schema definition for Tributary.

/// Database schema definition.
///
/// `column_name` is stored as `''` for object-level nodes so the identity
/// UNIQUE constraint applies (SQLite treats NULLs as distinct). Likewise
/// `producer_key` mirrors `producer_id` with `0` standing for "no producer".
pub(crate) const SCHEMA: &str = r"
-- Catalog: tables, views, columns, routines and transient constructs
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    database_name TEXT NOT NULL,
    schema_name TEXT NOT NULL,
    object_name TEXT NOT NULL,
    column_name TEXT NOT NULL DEFAULT '',
    data_type TEXT,
    nullable INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (kind, database_name, schema_name, object_name, column_name)
);

CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(schema_name, object_name, column_name);
CREATE INDEX IF NOT EXISTS idx_nodes_active_kind ON nodes(kind) WHERE active = 1;

-- Lineage edges: target derives from source, asserted by producer
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    producer_id INTEGER REFERENCES nodes(id) ON DELETE CASCADE,
    producer_key INTEGER NOT NULL DEFAULT 0,
    kind TEXT NOT NULL,
    description TEXT,
    line INTEGER,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    active INTEGER NOT NULL DEFAULT 1,
    provisional INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (source_id <> target_id),
    UNIQUE (source_id, target_id, producer_key)
);

CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id) WHERE active = 1;
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id) WHERE active = 1;
CREATE INDEX IF NOT EXISTS idx_edges_producer ON edges(producer_key);

-- Run ledger (append-only audit trail, independent of nodes/edges)
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY,
    scope TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    finished_at INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    edges_written INTEGER NOT NULL,
    warning_count INTEGER NOT NULL,
    low_certainty_edges INTEGER NOT NULL,
    aggregate_confidence REAL,
    status TEXT NOT NULL,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_scope ON runs(scope);

CREATE TABLE IF NOT EXISTS run_warnings (
    id INTEGER PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    message TEXT NOT NULL,
    line INTEGER,
    column_number INTEGER
);

CREATE INDEX IF NOT EXISTS idx_run_warnings_run ON run_warnings(run_id);
";
