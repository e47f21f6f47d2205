//! Catalog operations: node find-or-create, lookup and deactivation.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace, warn};

use super::helpers::{is_busy, row_to_node, NODES_COLUMNS};
use super::Store;
use crate::error::{Error, Result};
use crate::types::{Node, NodeId, NodeKind, NodeLocator, NodeSpec};

/// Identity tuple of a catalog node, as stored.
///
/// `column` is `""` for object-level nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub kind: NodeKind,
    pub database: String,
    pub schema: String,
    pub object: String,
    pub column: String,
}

impl From<&NodeSpec> for NodeKey {
    fn from(spec: &NodeSpec) -> Self {
        Self {
            kind: spec.kind,
            database: spec.database.clone(),
            schema: spec.schema.clone(),
            object: spec.object.clone(),
            column: spec.column.clone().unwrap_or_default(),
        }
    }
}

/// Atomically find-or-create a node on an open connection or transaction.
///
/// A single `INSERT .. ON CONFLICT .. DO UPDATE .. RETURNING` statement:
/// concurrent creators of the same identity resolve to the one row. On a
/// match only `data_type` and `nullable` change (and only when provided),
/// the node is reactivated, and `created_at` is left alone.
pub(crate) fn upsert_node_in(conn: &Connection, spec: &NodeSpec, now_ms: i64) -> Result<NodeId> {
    spec.validate()?;
    trace!(node = %spec.qualified_name(), kind = %spec.kind, "Upserting node");

    let id: i64 = conn.query_row(
        "INSERT INTO nodes (kind, database_name, schema_name, object_name, column_name,
                            data_type, nullable, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
         ON CONFLICT(kind, database_name, schema_name, object_name, column_name) DO UPDATE SET
             data_type = COALESCE(excluded.data_type, nodes.data_type),
             nullable = COALESCE(excluded.nullable, nodes.nullable),
             active = 1,
             updated_at = excluded.updated_at
         RETURNING id",
        params![
            spec.kind.as_str(),
            spec.database,
            spec.schema,
            spec.object,
            spec.column.as_deref().unwrap_or(""),
            spec.data_type,
            spec.nullable,
            now_ms
        ],
        |row| row.get(0),
    )?;

    Ok(NodeId::from(id))
}

/// Look up whether a node identity is stored, and whether it is active.
///
/// Returns `None` when the identity has never been recorded.
pub(crate) fn node_state_in(conn: &Connection, key: &NodeKey) -> Result<Option<bool>> {
    conn.query_row(
        "SELECT active FROM nodes
         WHERE kind = ?1 AND database_name = ?2 AND schema_name = ?3
           AND object_name = ?4 AND column_name = ?5",
        params![
            key.kind.as_str(),
            key.database,
            key.schema,
            key.object,
            key.column
        ],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Deactivate every active, schema-verifiable node not listed in `live`.
///
/// Columns belonging to transient constructs (a column of a CTE, for
/// example) are never in a live listing, so they are left alone. Edges are
/// not touched. Returns the number of nodes deactivated.
pub(crate) fn deactivate_missing_in(conn: &Connection, live: &[NodeKey], now_ms: i64) -> Result<usize> {
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS live_nodes (
             kind TEXT NOT NULL,
             database_name TEXT NOT NULL,
             schema_name TEXT NOT NULL,
             object_name TEXT NOT NULL,
             column_name TEXT NOT NULL,
             PRIMARY KEY (kind, database_name, schema_name, object_name, column_name)
         );
         DELETE FROM temp.live_nodes;",
    )?;

    {
        let mut insert = conn.prepare(
            "INSERT OR IGNORE INTO temp.live_nodes
             (kind, database_name, schema_name, object_name, column_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for key in live {
            insert.execute(params![
                key.kind.as_str(),
                key.database,
                key.schema,
                key.object,
                key.column
            ])?;
        }
    }

    let deactivated = conn.execute(
        "UPDATE nodes SET active = 0, updated_at = ?1
         WHERE active = 1
           AND kind IN ('table', 'view', 'column', 'routine')
           AND NOT EXISTS (
               SELECT 1 FROM temp.live_nodes l
               WHERE l.kind = nodes.kind
                 AND l.database_name = nodes.database_name
                 AND l.schema_name = nodes.schema_name
                 AND l.object_name = nodes.object_name
                 AND l.column_name = nodes.column_name)
           AND NOT (
               nodes.kind = 'column' AND EXISTS (
                   SELECT 1 FROM nodes parent
                   WHERE parent.kind IN ('trigger', 'named_subquery', 'temporary_table',
                                         'table_variable', 'derived_table')
                     AND parent.database_name = nodes.database_name
                     AND parent.schema_name = nodes.schema_name
                     AND parent.object_name = nodes.object_name))",
        [now_ms],
    )?;

    conn.execute("DELETE FROM temp.live_nodes", [])?;
    debug!(deactivated, live = live.len(), "Deactivated nodes missing from live schema");

    Ok(deactivated)
}

impl Store {
    /// Find-or-create a node, retrying while another connection holds the lock.
    ///
    /// Returns the same ID for every call with the same identity.
    pub fn upsert_node(&self, spec: &NodeSpec) -> Result<NodeId> {
        let attempts = self.storage().upsert_retries;
        let mut attempt = 1;
        loop {
            let result = {
                let conn = self.connection()?;
                upsert_node_in(&conn, spec, Self::now_ms())
            };
            match result {
                Err(Error::Database(ref e)) if is_busy(e) && attempt < attempts => {
                    warn!(
                        node = %spec.qualified_name(),
                        attempt,
                        "Database busy during node upsert, retrying"
                    );
                    attempt += 1;
                    std::thread::sleep(std::time::Duration::from_millis(10 * u64::from(attempt)));
                }
                other => return other,
            }
        }
    }

    /// Get a node by its database ID, active or not.
    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let conn = self.connection()?;

        conn.query_row(
            &format!("SELECT {NODES_COLUMNS} FROM nodes WHERE id = ?1"),
            [id.as_i64()],
            row_to_node,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Find active nodes matching a locator, ordered by qualified name.
    ///
    /// A locator without a column only matches object-level nodes.
    pub fn find_nodes(&self, locator: &NodeLocator) -> Result<Vec<Node>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {NODES_COLUMNS} FROM nodes
             WHERE active = 1
               AND schema_name = ?1 AND object_name = ?2 AND column_name = ?3
               AND (?4 IS NULL OR database_name = ?4)
             ORDER BY database_name, kind"
        ))?;

        let nodes = stmt
            .query_map(
                params![
                    locator.schema,
                    locator.object,
                    locator.column.as_deref().unwrap_or(""),
                    locator.database
                ],
                row_to_node,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    /// Resolve a locator to exactly one active node.
    ///
    /// Fails with `NodeNotFound` when nothing matches and `AmbiguousNode`
    /// when several nodes do (different databases or kinds).
    pub fn resolve(&self, locator: &NodeLocator) -> Result<Node> {
        let mut nodes = self.find_nodes(locator)?;
        match nodes.len() {
            0 => Err(Error::NodeNotFound(locator.to_string())),
            1 => Ok(nodes.remove(0)),
            _ => Err(Error::AmbiguousNode {
                locator: locator.to_string(),
                candidates: nodes
                    .iter()
                    .map(|n| format!("{} ({})", n.qualified_name(), n.kind))
                    .collect(),
            }),
        }
    }

    /// List catalog nodes ordered by qualified name.
    pub fn list_nodes(&self, include_inactive: bool) -> Result<Vec<Node>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {NODES_COLUMNS} FROM nodes
             WHERE ?1 OR active = 1
             ORDER BY database_name, schema_name, object_name, column_name, kind"
        ))?;

        let nodes = stmt
            .query_map([include_inactive], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    /// Deactivate schema-verifiable nodes absent from `live`, in one transaction.
    pub(crate) fn deactivate_missing(&self, live: &[NodeKey]) -> Result<usize> {
        self.write(|tx| deactivate_missing_in(tx, live, Self::now_ms()))
    }
}
