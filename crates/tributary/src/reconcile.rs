//! Reconciliation of the catalog against the live schema.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{deactivate_missing_in, node_state_in, upsert_node_in, NodeKey, Store};
use crate::error::{Error, Result};
use crate::types::{NodeKind, NodeSpec};

/// An object as listed by a schema inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveObject {
    /// Table, view or routine
    pub kind: NodeKind,
    /// Database (catalog) name
    pub database: String,
    /// Schema name
    pub schema: String,
    /// Object name
    pub name: String,
    /// Columns, for tables and views
    #[serde(default)]
    pub columns: Vec<LiveColumn>,
}

/// A column as listed by a schema inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    /// Column name
    pub name: String,
    /// Declared data type
    #[serde(default)]
    pub data_type: Option<String>,
    /// Declared nullability
    #[serde(default)]
    pub nullable: Option<bool>,
}

impl LiveObject {
    /// Node declarations for the object and each of its columns.
    fn node_specs(&self) -> Result<Vec<NodeSpec>> {
        if !self.kind.is_schema_verifiable() || self.kind == NodeKind::Column {
            return Err(Error::InvalidNode(format!(
                "live schema listing contains {} {}.{}.{}, only tables, views and routines are accepted",
                self.kind, self.database, self.schema, self.name
            )));
        }

        let mut specs = vec![NodeSpec::object(
            self.kind,
            &self.database,
            &self.schema,
            &self.name,
        )];
        for column in &self.columns {
            specs.push(NodeSpec {
                data_type: column.data_type.clone(),
                nullable: column.nullable,
                ..NodeSpec::column(&self.database, &self.schema, &self.name, &column.name)
            });
        }
        Ok(specs)
    }
}

/// Result of a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Nodes created or reactivated
    pub inserted: usize,
    /// Nodes deactivated because they vanished from the live schema
    pub deactivated: usize,
}

/// Result of a wipe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WipeReport {
    /// Whether anything was deleted
    pub performed: bool,
    /// Human-readable outcome
    pub message: String,
    /// Nodes deleted
    pub nodes: usize,
    /// Edges deleted
    pub edges: usize,
    /// Runs deleted
    pub runs: usize,
    /// Run warnings deleted
    pub warnings: usize,
}

/// Align the catalog with a live schema listing, in one transaction.
///
/// Missing objects and columns are inserted, inactive ones reactivated, and
/// active tables, views, columns and routines absent from the listing are
/// deactivated. Edges are never touched. Repeating a sync with the same
/// listing changes nothing.
pub fn sync(store: &Store, live: &[LiveObject]) -> Result<SyncReport> {
    let specs: Vec<NodeSpec> = live
        .iter()
        .map(LiveObject::node_specs)
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    let report = store.write(|tx| {
        let now = Store::now_ms();
        let mut report = SyncReport::default();
        let mut keys = Vec::with_capacity(specs.len());

        for spec in &specs {
            let key = NodeKey::from(spec);
            if node_state_in(tx, &key)? != Some(true) {
                report.inserted += 1;
            }
            upsert_node_in(tx, spec, now)?;
            keys.push(key);
        }

        report.deactivated = deactivate_missing_in(tx, &keys, now)?;
        Ok(report)
    })?;

    info!(
        objects = live.len(),
        inserted = report.inserted,
        deactivated = report.deactivated,
        "Synchronized catalog with live schema"
    );
    Ok(report)
}

/// Deactivate active tables, views, columns and routines absent from `live`
/// without inserting anything. Returns the number deactivated.
pub fn deactivate_missing(store: &Store, live: &[LiveObject]) -> Result<usize> {
    let mut keys = Vec::new();
    for object in live {
        keys.extend(object.node_specs()?.iter().map(NodeKey::from));
    }

    let deactivated = store.deactivate_missing(&keys)?;
    info!(deactivated, "Deactivated nodes missing from live schema");
    Ok(deactivated)
}

/// Delete every node, edge and run, but only when `confirmed`.
///
/// An unconfirmed request is a no-op and not an error.
pub fn wipe(store: &Store, confirmed: bool) -> Result<WipeReport> {
    if !confirmed {
        let message =
            "wipe not confirmed; nothing was deleted (pass confirmation to delete all lineage data)"
                .to_string();
        info!("{message}");
        return Ok(WipeReport {
            performed: false,
            message,
            nodes: 0,
            edges: 0,
            runs: 0,
            warnings: 0,
        });
    }

    let counts = store.clear_all()?;
    info!(
        nodes = counts.nodes,
        edges = counts.edges,
        runs = counts.runs,
        "Wiped lineage database"
    );

    Ok(WipeReport {
        performed: true,
        message: format!(
            "deleted {} nodes, {} edges and {} runs",
            counts.nodes, counts.edges, counts.runs
        ),
        nodes: counts.nodes,
        edges: counts.edges,
        runs: counts.runs,
        warnings: counts.warnings,
    })
}
