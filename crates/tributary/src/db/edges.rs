//! Edge store operations: upsert, stale-edge reconciliation and neighbour queries.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::trace;

use super::helpers::{
    prefixed, row_to_edge, row_to_edge_at, row_to_node_at, EDGES_COLUMNS, NODES_COLUMNS,
    NODES_COLUMN_COUNT,
};
use super::Store;
use crate::error::{Error, Result};
use crate::graph::{Direction, Hop};
use crate::types::{Edge, EdgeId, EdgeSpec, NodeId};

/// Number of columns in [`EDGES_COLUMNS`].
const EDGES_COLUMN_COUNT: usize = 12;

fn require_node(conn: &Connection, id: NodeId, role: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
        [id.as_i64()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::NodeNotFound(format!("{role} node id {id}")))
    }
}

/// Insert or update an edge on an open connection or transaction.
///
/// The key is (source, target, producer). A repeated assertion updates the
/// transformation details in place, reactivates the edge and clears its
/// provisional mark. Validation runs before anything is written.
pub(crate) fn upsert_edge_in(conn: &Connection, spec: &EdgeSpec, now_ms: i64) -> Result<EdgeId> {
    spec.validate()?;
    require_node(conn, spec.source, "source")?;
    require_node(conn, spec.target, "target")?;
    if let Some(producer) = spec.producer {
        require_node(conn, producer, "producer")?;
    }

    trace!(
        source = %spec.source,
        target = %spec.target,
        producer = ?spec.producer,
        kind = %spec.kind,
        confidence = spec.confidence,
        "Upserting edge"
    );

    let id: i64 = conn.query_row(
        "INSERT INTO edges (source_id, target_id, producer_id, producer_key, kind,
                            description, line, confidence, active, provisional,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, COALESCE(?3, 0), ?4, ?5, ?6, ?7, 1, 0, ?8, ?8)
         ON CONFLICT(source_id, target_id, producer_key) DO UPDATE SET
             kind = excluded.kind,
             description = excluded.description,
             line = excluded.line,
             confidence = excluded.confidence,
             active = 1,
             provisional = 0,
             updated_at = excluded.updated_at
         RETURNING id",
        params![
            spec.source.as_i64(),
            spec.target.as_i64(),
            spec.producer.map(NodeId::as_i64),
            spec.kind.as_str(),
            spec.description,
            spec.line,
            spec.confidence,
            now_ms
        ],
        |row| row.get(0),
    )?;

    Ok(EdgeId::from(id))
}

/// Flag every active edge of `producer` as provisional.
///
/// First step of re-analyzing a producing object. Returns the number flagged.
pub(crate) fn mark_provisional_in(conn: &Connection, producer: NodeId) -> Result<usize> {
    let marked = conn.execute(
        "UPDATE edges SET provisional = 1 WHERE producer_key = ?1 AND active = 1",
        [producer.as_i64()],
    )?;
    trace!(producer = %producer, marked, "Marked producer edges provisional");
    Ok(marked)
}

/// Deactivate the edges of `producer` that are still provisional.
///
/// Edges re-asserted since [`mark_provisional_in`] have had their flag
/// cleared and survive. Returns the number deactivated.
pub(crate) fn sweep_provisional_in(conn: &Connection, producer: NodeId, now_ms: i64) -> Result<usize> {
    let swept = conn.execute(
        "UPDATE edges SET active = 0, provisional = 0, updated_at = ?2
         WHERE producer_key = ?1 AND provisional = 1",
        params![producer.as_i64(), now_ms],
    )?;
    trace!(producer = %producer, swept, "Swept stale producer edges");
    Ok(swept)
}

impl Store {
    /// Insert or update a single edge in its own transaction.
    pub fn upsert_edge(&self, spec: &EdgeSpec) -> Result<EdgeId> {
        self.write(|tx| upsert_edge_in(tx, spec, Self::now_ms()))
    }

    /// Flag a producer's active edges provisional, in its own transaction.
    pub fn mark_provisional(&self, producer: NodeId) -> Result<usize> {
        self.write(|tx| mark_provisional_in(tx, producer))
    }

    /// Deactivate a producer's still-provisional edges, in its own transaction.
    pub fn sweep_provisional(&self, producer: NodeId) -> Result<usize> {
        self.write(|tx| sweep_provisional_in(tx, producer, Self::now_ms()))
    }

    /// Get an edge by its database ID, active or not.
    pub fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        let conn = self.connection()?;

        conn.query_row(
            &format!("SELECT {EDGES_COLUMNS} FROM edges WHERE id = ?1"),
            [id.as_i64()],
            row_to_edge,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Every edge asserted by `producer`, active or not, in insertion order.
    pub fn edges_for_producer(&self, producer: NodeId) -> Result<Vec<Edge>> {
        self.query_edges(
            &format!("SELECT {EDGES_COLUMNS} FROM edges WHERE producer_key = ?1 ORDER BY id"),
            producer.as_i64(),
        )
    }

    /// Active edges whose target is `node`.
    pub fn incoming(&self, node: NodeId) -> Result<Vec<Edge>> {
        self.query_edges(
            &format!(
                "SELECT {EDGES_COLUMNS} FROM edges WHERE target_id = ?1 AND active = 1 ORDER BY id"
            ),
            node.as_i64(),
        )
    }

    /// Active edges whose source is `node`.
    pub fn outgoing(&self, node: NodeId) -> Result<Vec<Edge>> {
        self.query_edges(
            &format!(
                "SELECT {EDGES_COLUMNS} FROM edges WHERE source_id = ?1 AND active = 1 ORDER BY id"
            ),
            node.as_i64(),
        )
    }

    /// List edges in insertion order.
    pub fn list_edges(&self, include_inactive: bool) -> Result<Vec<Edge>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGES_COLUMNS} FROM edges WHERE ?1 OR active = 1 ORDER BY id"
        ))?;
        let edges = stmt
            .query_map([include_inactive], row_to_edge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(edges)
    }

    /// Number of active edges into `node` from active source nodes.
    ///
    /// Zero means `node` is a true source.
    pub fn count_active_incoming(&self, node: NodeId) -> Result<usize> {
        let conn = self.connection()?;

        let count = conn.query_row(
            "SELECT COUNT(*) FROM edges e
             JOIN nodes s ON s.id = e.source_id
             WHERE e.target_id = ?1 AND e.active = 1 AND s.active = 1",
            [node.as_i64()],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// One expansion step: active edges leaving `node` in `direction`, each
    /// with the active node at the far end and the edge's producer.
    ///
    /// Ordered by the far node's qualified name.
    pub fn hops(&self, node: NodeId, direction: Direction) -> Result<Vec<Hop>> {
        let (near, far) = match direction {
            Direction::Downstream => ("source_id", "target_id"),
            Direction::Upstream => ("target_id", "source_id"),
        };

        let sql = format!(
            "SELECT {edge}, {next}, {producer}
             FROM edges e
             JOIN nodes n ON n.id = e.{far} AND n.active = 1
             LEFT JOIN nodes p ON p.id = e.producer_id
             WHERE e.{near} = ?1 AND e.active = 1
             ORDER BY n.database_name || '.' || n.schema_name || '.' || n.object_name
                      || CASE WHEN n.column_name = '' THEN '' ELSE '.' || n.column_name END,
                      e.id",
            edge = prefixed("e", EDGES_COLUMNS),
            next = prefixed("n", NODES_COLUMNS),
            producer = prefixed("p", NODES_COLUMNS),
        );

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let hops = stmt
            .query_map([node.as_i64()], |row| {
                let producer_offset = EDGES_COLUMN_COUNT + NODES_COLUMN_COUNT;
                let producer = match row.get::<_, Option<i64>>(producer_offset)? {
                    Some(_) => Some(row_to_node_at(row, producer_offset)?),
                    None => None,
                };
                Ok(Hop {
                    edge: row_to_edge_at(row, 0)?,
                    node: row_to_node_at(row, EDGES_COLUMN_COUNT)?,
                    producer,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hops)
    }

    fn query_edges(&self, sql: &str, id: i64) -> Result<Vec<Edge>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(sql)?;
        let edges = stmt
            .query_map([id], row_to_edge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(edges)
    }
}
