//! `SQLite` storage layer for Tributary.
//!
//! `SQLite` is the single source of truth for catalog and edge state and
//! for the run ledger. See the `graph` module for the traversal engine built
//! on top of this storage layer.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `nodes` - Catalog operations (atomic find-or-create, deactivation)
//! - `edges` - Edge store operations (upsert, provisional mark/sweep, hops)
//! - `runs` - Run ledger (append-only)

mod edges;
mod helpers;
mod nodes;
mod runs;
mod schema;

pub(crate) use edges::{mark_provisional_in, sweep_provisional_in, upsert_edge_in};
pub(crate) use nodes::{deactivate_missing_in, node_state_in, upsert_node_in, NodeKey};
pub(crate) use schema::SCHEMA;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::{DatabaseStats, NodeKind};

/// Rows removed by [`Store::clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ClearedCounts {
    pub nodes: usize,
    pub edges: usize,
    pub runs: usize,
    pub warnings: usize,
}

/// `SQLite` database wrapper for the lineage catalog.
///
/// The connection is wrapped in a `Mutex` so a single `Store` can be shared
/// across threads. Each operation holds the lock only for its own statements;
/// traversals re-acquire it per expansion step.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
    storage: StorageConfig,
}

impl Store {
    /// Open or create the lineage database.
    pub fn open(path: &Path, storage: &StorageConfig) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Concurrent writers queue for up to the busy timeout instead of
        // failing immediately. WAL lets readers proceed during a write.
        conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Apply schema
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            storage: storage.clone(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Storage settings this store was opened with.
    pub(crate) fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Acquire the connection lock.
    ///
    /// Returns a `MutexGuard` providing exclusive access to the underlying connection.
    /// Used internally by all database operations.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Run `f` inside an `IMMEDIATE` transaction, committing on `Ok`.
    ///
    /// `IMMEDIATE` takes the write lock up front, so two connections never
    /// deadlock trying to upgrade read locks. Returning `Err` from `f` drops
    /// the transaction, which rolls everything back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Current time as unix milliseconds, the storage format for timestamps.
    pub(crate) fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Delete every node, edge, run and warning.
    ///
    /// Counts are taken inside the same transaction as the deletes.
    pub(crate) fn clear_all(&self) -> Result<ClearedCounts> {
        self.write(|tx| {
            let count = |table: &str| -> Result<usize> {
                Ok(tx.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
            };
            let counts = ClearedCounts {
                nodes: count("nodes")?,
                edges: count("edges")?,
                runs: count("runs")?,
                warnings: count("run_warnings")?,
            };

            // Children first so foreign keys never dangle mid-statement
            tx.execute_batch(
                "DELETE FROM run_warnings;
                 DELETE FROM runs;
                 DELETE FROM edges;
                 DELETE FROM nodes;",
            )?;
            Ok(counts)
        })
    }

    /// Get statistics about the database contents.
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.connection()?;
        let mut stats = DatabaseStats::default();

        // Node counts by kind and activity
        let mut stmt = conn.prepare("SELECT kind, active, COUNT(*) FROM nodes GROUP BY kind, active")?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let active: bool = row.get(1)?;
            let count: usize = row.get(2)?;
            Ok((kind, active, count))
        })?;

        for row in rows {
            let (kind_str, active, count) = row?;
            if !active {
                stats.inactive_nodes += count;
                continue;
            }
            match kind_str.parse::<NodeKind>() {
                Ok(kind) => {
                    stats.active_nodes_by_kind.insert(kind, count);
                    stats.active_nodes += count;
                }
                Err(_) => {
                    tracing::warn!(
                        kind = %kind_str,
                        count = count,
                        "Unknown node kind in database, skipping from stats"
                    );
                }
            }
        }

        let (active, inactive, provisional): (usize, usize, usize) = conn.query_row(
            "SELECT
                COALESCE(SUM(active = 1), 0),
                COALESCE(SUM(active = 0), 0),
                COALESCE(SUM(provisional = 1), 0)
             FROM edges",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        stats.active_edges = active;
        stats.inactive_edges = inactive;
        stats.provisional_edges = provisional;

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM runs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.runs_by_status.insert(status, count);
        }

        Ok(stats)
    }

    /// Update `SQLite` query planner statistics.
    ///
    /// Worth calling after a large batch ingestion.
    pub fn analyze(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute_batch("ANALYZE")?;
        Ok(())
    }

    /// Vacuum the database.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}
