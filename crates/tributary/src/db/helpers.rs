//! Helper functions for database row conversion and parsing.
//!
//! These utilities convert between database representations and domain types.
//! Also provides SQL column list constants to reduce duplication across query modules.

use chrono::{DateTime, Utc};

use crate::types::{
    Edge, EdgeId, Node, NodeId, NodeKind, Run, RunId, RunStatus, RunWarning, TransformKind,
};

/// Number of columns in [`NODES_COLUMNS`].
pub(crate) const NODES_COLUMN_COUNT: usize = 11;

/// SQL column list for the nodes table.
///
/// Use with `row_to_node` for consistent column ordering.
pub(crate) const NODES_COLUMNS: &str =
    "id, kind, database_name, schema_name, object_name, column_name, \
     data_type, nullable, active, created_at, updated_at";

/// SQL column list for the edges table.
///
/// Use with `row_to_edge` for consistent column ordering.
pub(crate) const EDGES_COLUMNS: &str =
    "id, source_id, target_id, producer_id, kind, description, line, confidence, \
     active, provisional, created_at, updated_at";

/// SQL column list for the runs table.
pub(crate) const RUNS_COLUMNS: &str =
    "id, scope, started_at, finished_at, duration_ms, edges_written, warning_count, \
     low_certainty_edges, aggregate_confidence, status, error";

/// Prefix every column in a column list with a table alias.
///
/// `prefixed("n", "id, kind")` yields `"n.id, n.kind"`.
pub(crate) fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether an error means another connection holds the database lock.
pub(crate) fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn corrupt(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, message.into())
}

/// Parse a node kind string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_node_kind(s: &str) -> rusqlite::Result<NodeKind> {
    s.parse().map_err(|_| {
        corrupt(
            0,
            format!("Unknown node kind '{s}' in database. Database may be corrupted or from a newer version."),
        )
    })
}

/// Parse a transformation kind string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_transform_kind(s: &str) -> rusqlite::Result<TransformKind> {
    s.parse().map_err(|_| {
        corrupt(
            0,
            format!("Unknown transformation kind '{s}' in database. Database may be corrupted or from a newer version."),
        )
    })
}

/// Parse a run status string from the database.
pub(crate) fn parse_run_status(s: &str) -> rusqlite::Result<RunStatus> {
    match s {
        "success" => Ok(RunStatus::Success),
        "partial_success" => Ok(RunStatus::PartialSuccess),
        "failed" => Ok(RunStatus::Failed),
        unknown => Err(corrupt(
            0,
            format!("Unknown run status '{unknown}' in database. Database may be corrupted or from a newer version."),
        )),
    }
}

/// Convert stored unix milliseconds to a UTC timestamp.
pub(crate) fn millis_to_datetime(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp {ms} out of range").into(),
        )
    })
}

/// Convert a database row to a [`Node`], reading columns starting at `offset`.
///
/// Expected columns: see [`NODES_COLUMNS`].
pub(crate) fn row_to_node_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Node> {
    let column: String = row.get(offset + 5)?;
    Ok(Node {
        id: NodeId::from(row.get::<_, i64>(offset)?),
        kind: parse_node_kind(&row.get::<_, String>(offset + 1)?)?,
        database: row.get(offset + 2)?,
        schema: row.get(offset + 3)?,
        object: row.get(offset + 4)?,
        column: (!column.is_empty()).then_some(column),
        data_type: row.get(offset + 6)?,
        nullable: row.get(offset + 7)?,
        active: row.get(offset + 8)?,
        created_at: millis_to_datetime(row.get(offset + 9)?)?,
        updated_at: millis_to_datetime(row.get(offset + 10)?)?,
    })
}

/// Convert a database row to a [`Node`].
pub(crate) fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    row_to_node_at(row, 0)
}

/// Convert a database row to an [`Edge`], reading columns starting at `offset`.
///
/// Expected columns: see [`EDGES_COLUMNS`].
pub(crate) fn row_to_edge_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Edge> {
    Ok(Edge {
        id: EdgeId::from(row.get::<_, i64>(offset)?),
        source: NodeId::from(row.get::<_, i64>(offset + 1)?),
        target: NodeId::from(row.get::<_, i64>(offset + 2)?),
        producer: row.get::<_, Option<i64>>(offset + 3)?.map(NodeId::from),
        kind: parse_transform_kind(&row.get::<_, String>(offset + 4)?)?,
        description: row.get(offset + 5)?,
        line: row.get(offset + 6)?,
        confidence: row.get(offset + 7)?,
        active: row.get(offset + 8)?,
        provisional: row.get(offset + 9)?,
        created_at: millis_to_datetime(row.get(offset + 10)?)?,
        updated_at: millis_to_datetime(row.get(offset + 11)?)?,
    })
}

/// Convert a database row to an [`Edge`].
pub(crate) fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    row_to_edge_at(row, 0)
}

/// Convert a database row to a [`Run`].
///
/// Expected columns: see [`RUNS_COLUMNS`].
pub(crate) fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    Ok(Run {
        id: RunId::from(row.get::<_, i64>(0)?),
        scope: row.get(1)?,
        started_at: millis_to_datetime(row.get(2)?)?,
        finished_at: millis_to_datetime(row.get(3)?)?,
        duration_ms: row.get(4)?,
        edges_written: row.get(5)?,
        warning_count: row.get(6)?,
        low_certainty_edges: row.get(7)?,
        aggregate_confidence: row.get(8)?,
        status: parse_run_status(&row.get::<_, String>(9)?)?,
        error: row.get(10)?,
    })
}

/// Convert a database row to a [`RunWarning`].
///
/// Expected columns: kind, message, line, `column_number`
pub(crate) fn row_to_warning(row: &rusqlite::Row) -> rusqlite::Result<RunWarning> {
    Ok(RunWarning {
        kind: row.get(0)?,
        message: row.get(1)?,
        line: row.get(2)?,
        column: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_qualifies_every_column() {
        assert_eq!(prefixed("n", "id, kind,active"), "n.id, n.kind, n.active");
    }

    #[test]
    fn node_columns_count_matches_constant() {
        assert_eq!(NODES_COLUMNS.split(',').count(), NODES_COLUMN_COUNT);
    }

    #[test]
    fn parse_run_status_rejects_unknown() {
        assert!(parse_run_status("running").is_err());
        assert_eq!(
            parse_run_status("partial_success").unwrap(),
            RunStatus::PartialSuccess
        );
    }

    #[test]
    fn parse_kinds_reject_unknown() {
        assert!(parse_node_kind("index").is_err());
        assert!(parse_transform_kind("pivot").is_err());
        assert_eq!(parse_node_kind("view").unwrap(), NodeKind::View);
    }
}
