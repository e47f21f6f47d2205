//! Analysis ingestion: write one producing object's lineage as a unit.
//!
//! An analyzer describes one producing object (view, routine) at a time as
//! an [`ObjectAnalysis`]. Ingesting it is one transaction:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ BEGIN IMMEDIATE                                              │
//! │   upsert producer + declared nodes                           │
//! │   mark producer's active edges provisional                   │
//! │   upsert each valid edge (clears its provisional mark)       │
//! │   sweep edges still provisional (no longer produced)         │
//! │ COMMIT                   (any storage error: ROLLBACK)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ append run record (success / partial success / failed)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invalid assertions are skipped with a warning instead of failing the
//! object. Batches run objects in parallel, one connection per worker.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use rayon::prelude::*;
use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::{
    mark_provisional_in, sweep_provisional_in, upsert_edge_in, upsert_node_in, Store,
};
use crate::error::{Error, Result};
use crate::types::{
    qualified_name, EdgeSpec, NodeId, NodeKind, NodeSpec, RunId, RunRecord, RunStatus, RunWarning,
    TransformKind,
};

/// Warning kind recorded for an assertion that was not written.
pub const REJECTED_EDGE: &str = "rejected_edge";

/// Warning kind recorded for a node declaration that was not written.
pub const REJECTED_NODE: &str = "rejected_node";

/// An analyzer's output for one producing object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnalysis {
    /// The view, routine or trigger whose logic was analyzed
    pub producer: NodeDeclaration,
    /// Nodes referenced by the edges
    #[serde(default)]
    pub nodes: Vec<NodeDeclaration>,
    /// Derivations found in the producer's logic
    #[serde(default)]
    pub edges: Vec<EdgeAssertion>,
    /// Analyzer diagnostics (dynamic SQL, unresolved names, ...)
    #[serde(default)]
    pub warnings: Vec<RunWarning>,
}

/// A node as an analyzer declares it.
///
/// The kind stays a string until ingestion so that one unrecognized kind
/// rejects only that declaration, not the whole analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDeclaration {
    /// Node kind, e.g. `column` or `named_subquery`
    pub kind: String,
    /// Database (catalog) name
    pub database: String,
    /// Schema name
    pub schema: String,
    /// Table, view, routine or construct name
    pub object: String,
    /// Column name, for column nodes
    #[serde(default)]
    pub column: Option<String>,
    /// Declared data type
    #[serde(default)]
    pub data_type: Option<String>,
    /// Declared nullability
    #[serde(default)]
    pub nullable: Option<bool>,
}

impl NodeDeclaration {
    /// Fully-qualified name of the declared node.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified_name(
            &self.database,
            &self.schema,
            &self.object,
            self.column.as_deref(),
        )
    }

    /// Parse the kind, producing a typed [`NodeSpec`].
    pub fn to_spec(&self) -> Result<NodeSpec> {
        Ok(NodeSpec {
            kind: self.kind.parse()?,
            database: self.database.clone(),
            schema: self.schema.clone(),
            object: self.object.clone(),
            column: self.column.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
        })
    }
}

impl From<NodeSpec> for NodeDeclaration {
    fn from(spec: NodeSpec) -> Self {
        Self {
            kind: spec.kind.into(),
            database: spec.database,
            schema: spec.schema,
            object: spec.object,
            column: spec.column,
            data_type: spec.data_type,
            nullable: spec.nullable,
        }
    }
}

/// One derivation asserted by an analyzer.
///
/// `source` and `target` are qualified names of nodes declared in the same
/// [`ObjectAnalysis`] (the producer included). When two declared nodes of
/// different kinds share a name, prefix the kind: `routine:db.dbo.load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeAssertion {
    /// Node the value is derived from
    pub source: String,
    /// Node whose value is derived
    pub target: String,
    /// Transformation kind, e.g. `direct` or `aggregation`
    pub kind: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Line in the producer's source
    #[serde(default)]
    pub line: Option<u32>,
    /// Estimated probability the derivation is correct
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Outcome of ingesting one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Ledger entry for this run
    pub run_id: RunId,
    /// Qualified name of the producing object
    pub scope: String,
    /// Terminal status
    pub status: RunStatus,
    /// Edges inserted or updated
    pub edges_written: usize,
    /// Previously produced edges no longer asserted, now inactive
    pub edges_deactivated: usize,
    /// Node declarations and edge assertions skipped as invalid
    pub rejected: usize,
    /// Written edges of unknown kind or below the confidence threshold
    pub low_certainty_edges: usize,
    /// Mean confidence of the written edges
    pub aggregate_confidence: Option<f64>,
    /// Error text for failed runs
    pub error: Option<String>,
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// One summary per object whose run was recorded, in input order
    pub runs: Vec<RunSummary>,
    /// Objects that could not even be recorded as failed runs
    pub errors: Vec<BatchError>,
}

/// An object whose ingestion left no run record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    /// Qualified name of the producing object
    pub scope: String,
    /// What went wrong
    pub message: String,
}

impl BatchSummary {
    /// Runs that ended with the given status.
    #[must_use]
    pub fn count(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|r| r.status == status).count()
    }

    /// Total edges written across the batch.
    #[must_use]
    pub fn edges_written(&self) -> usize {
        self.runs.iter().map(|r| r.edges_written).sum()
    }
}

/// What the transaction produced, before the run is recorded.
#[derive(Debug, Default)]
struct Written {
    edges: usize,
    deactivated: usize,
    low_certainty: usize,
    confidence_sum: f64,
    rejected: Vec<RunWarning>,
}

/// Declared nodes by qualified name, for resolving edge references.
struct Declared(HashMap<String, Vec<(NodeKind, NodeId)>>);

impl Declared {
    fn insert(&mut self, spec: &NodeSpec, id: NodeId) {
        self.0
            .entry(spec.qualified_name())
            .or_default()
            .push((spec.kind, id));
    }

    fn resolve(&self, reference: &str) -> std::result::Result<NodeId, String> {
        let (kind, name) = match reference.split_once(':') {
            Some((kind, name)) => (
                Some(kind.parse::<NodeKind>().map_err(|e| e.to_string())?),
                name.trim(),
            ),
            None => (None, reference.trim()),
        };

        let candidates: Vec<NodeId> = self
            .0
            .get(name)
            .into_iter()
            .flatten()
            .filter(|(k, _)| kind.is_none_or(|kind| kind == *k))
            .map(|(_, id)| *id)
            .collect();

        match candidates.as_slice() {
            [id] => Ok(*id),
            [] => Err(format!("'{reference}' is not a declared node")),
            _ => Err(format!(
                "'{reference}' matches several declared nodes, prefix it with a kind"
            )),
        }
    }
}

fn reject(rejected: &mut Vec<RunWarning>, kind: &str, message: String, line: Option<u32>) {
    warn!(kind, %message, "Rejected analyzer assertion");
    rejected.push(RunWarning::new(kind, message).at_line(line));
}

fn write_object(tx: &Transaction<'_>, analysis: &ObjectAnalysis, threshold: f64) -> Result<Written> {
    let now = Store::now_ms();
    let mut written = Written::default();
    let mut declared = Declared(HashMap::new());

    let producer_spec = analysis.producer.to_spec()?;
    let producer = upsert_node_in(tx, &producer_spec, now)?;
    declared.insert(&producer_spec, producer);

    for declaration in &analysis.nodes {
        match declaration
            .to_spec()
            .and_then(|spec| upsert_node_in(tx, &spec, now).map(|id| (spec, id)))
        {
            Ok((spec, id)) => declared.insert(&spec, id),
            Err(e) if e.is_validation() => {
                let message = format!("{}: {e}", declaration.qualified_name());
                reject(&mut written.rejected, REJECTED_NODE, message, None);
            }
            Err(e) => return Err(e),
        }
    }

    mark_provisional_in(tx, producer)?;

    for assertion in &analysis.edges {
        let resolved = declared.resolve(&assertion.source).and_then(|source| {
            let target = declared.resolve(&assertion.target)?;
            let kind = assertion
                .kind
                .parse::<TransformKind>()
                .map_err(|e| e.to_string())?;
            Ok((source, target, kind))
        });
        let (source, target, kind) = match resolved {
            Ok(parts) => parts,
            Err(message) => {
                reject(&mut written.rejected, REJECTED_EDGE, message, assertion.line);
                continue;
            }
        };

        let spec = EdgeSpec {
            source,
            target,
            kind,
            producer: Some(producer),
            description: assertion.description.clone(),
            line: assertion.line,
            confidence: assertion.confidence,
        };
        match upsert_edge_in(tx, &spec, now) {
            Ok(_) => {
                written.edges += 1;
                written.confidence_sum += spec.confidence;
                if kind == TransformKind::Unknown || spec.confidence < threshold {
                    written.low_certainty += 1;
                }
            }
            Err(e) if e.is_validation() => {
                let message = format!("{} -> {}: {e}", assertion.source, assertion.target);
                reject(&mut written.rejected, REJECTED_EDGE, message, assertion.line);
            }
            Err(e) => return Err(e),
        }
    }

    written.deactivated = sweep_provisional_in(tx, producer, now)?;
    Ok(written)
}

/// Ingest one object's analysis and record the run.
///
/// Storage failures roll the object back and are reported as a `Failed`
/// run, not as an `Err`. An `Err` means the run itself could not be
/// recorded.
pub fn ingest(store: &Store, analysis: &ObjectAnalysis, config: &Config) -> Result<RunSummary> {
    let scope = analysis.producer.qualified_name();
    let started_at = Utc::now();
    debug!(scope = %scope, edges = analysis.edges.len(), "Ingesting object analysis");

    let outcome = store.write(|tx| {
        write_object(tx, analysis, config.analysis.low_confidence_threshold)
    });

    let mut warnings = analysis.warnings.clone();
    let (record, deactivated, rejected) = match outcome {
        Ok(written) => {
            let status = if written.rejected.is_empty() {
                RunStatus::Success
            } else {
                RunStatus::PartialSuccess
            };
            let rejected = written.rejected.len();
            warnings.extend(written.rejected);
            #[allow(clippy::cast_precision_loss)]
            let aggregate = (written.edges > 0).then(|| written.confidence_sum / written.edges as f64);
            (
                RunRecord {
                    scope: scope.clone(),
                    started_at,
                    finished_at: Utc::now(),
                    edges_written: written.edges,
                    low_certainty_edges: written.low_certainty,
                    aggregate_confidence: aggregate,
                    status,
                    error: None,
                    warnings,
                },
                written.deactivated,
                rejected,
            )
        }
        Err(e) => {
            warn!(scope = %scope, error = %e, "Object ingestion failed, rolled back");
            (
                RunRecord {
                    scope: scope.clone(),
                    started_at,
                    finished_at: Utc::now(),
                    edges_written: 0,
                    low_certainty_edges: 0,
                    aggregate_confidence: None,
                    status: RunStatus::Failed,
                    error: Some(e.to_string()),
                    warnings,
                },
                0,
                0,
            )
        }
    };

    let run_id = store.record_run(&record)?;
    debug!(
        scope = %scope,
        status = %record.status,
        edges = record.edges_written,
        deactivated,
        "Object ingestion finished"
    );

    Ok(RunSummary {
        run_id,
        scope,
        status: record.status,
        edges_written: record.edges_written,
        edges_deactivated: deactivated,
        rejected,
        low_certainty_edges: record.low_certainty_edges,
        aggregate_confidence: record.aggregate_confidence,
        error: record.error,
    })
}

/// Ingest many objects in parallel against the database at `path`.
///
/// Each rayon worker opens its own connection. Objects are independent:
/// one failing never rolls back or blocks another.
pub fn ingest_batch(path: &Path, config: &Config, analyses: &[ObjectAnalysis]) -> BatchSummary {
    debug!(objects = analyses.len(), path = %path.display(), "Starting batch ingestion");

    let results: Vec<std::result::Result<RunSummary, BatchError>> = analyses
        .par_iter()
        .map_init(
            || Store::open(path, &config.storage),
            |store, analysis| {
                let scope = analysis.producer.qualified_name();
                let store = store.as_ref().map_err(|e| BatchError {
                    scope: scope.clone(),
                    message: format!("could not open database: {e}"),
                })?;
                ingest(store, analysis, config).map_err(|e: Error| BatchError {
                    scope,
                    message: e.to_string(),
                })
            },
        )
        .collect();

    let mut summary = BatchSummary::default();
    for result in results {
        match result {
            Ok(run) => summary.runs.push(run),
            Err(error) => summary.errors.push(error),
        }
    }

    debug!(
        runs = summary.runs.len(),
        failed = summary.count(RunStatus::Failed),
        errors = summary.errors.len(),
        "Batch ingestion finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;

    fn analysis() -> ObjectAnalysis {
        serde_json::from_str(
            r#"{
                "producer": {"kind": "view", "database": "db", "schema": "dbo", "object": "v_sales"},
                "nodes": [
                    {"kind": "column", "database": "db", "schema": "dbo", "object": "orders", "column": "amount"},
                    {"kind": "column", "database": "db", "schema": "dbo", "object": "v_sales", "column": "total"}
                ],
                "edges": [
                    {"source": "db.dbo.orders.amount", "target": "db.dbo.v_sales.total",
                     "kind": "aggregation", "line": 4, "confidence": 0.9}
                ],
                "warnings": [{"kind": "dynamic_sql", "message": "EXEC(@sql) not analyzed"}]
            }"#,
        )
        .expect("analysis JSON should parse")
    }

    #[test]
    fn declared_references_resolve_by_name_and_kind() {
        let mut declared = Declared(HashMap::new());
        declared.insert(&NodeSpec::object(NodeKind::Table, "db", "dbo", "t"), NodeId(1));
        declared.insert(&NodeSpec::object(NodeKind::Routine, "db", "dbo", "t"), NodeId(2));
        declared.insert(&NodeSpec::column("db", "dbo", "t", "c"), NodeId(3));

        assert_eq!(declared.resolve("db.dbo.t.c"), Ok(NodeId(3)));
        assert_eq!(declared.resolve("routine:db.dbo.t"), Ok(NodeId(2)));
        assert!(declared.resolve("db.dbo.t").unwrap_err().contains("several"));
        assert!(declared.resolve("db.dbo.missing").is_err());
        assert!(declared.resolve("index:db.dbo.t").is_err());
    }

    #[test]
    fn clean_analysis_succeeds_and_keeps_analyzer_warnings() {
        let (_dir, store) = temp_store();

        let summary = ingest(&store, &analysis(), &Config::default()).unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.edges_written, 1);
        assert_eq!(summary.low_certainty_edges, 0);
        assert_eq!(summary.aggregate_confidence, Some(0.9));
        assert_eq!(store.run_warnings(summary.run_id).unwrap().len(), 1);
    }

    #[test]
    fn invalid_assertions_are_skipped_as_partial_success() {
        let (_dir, store) = temp_store();
        let mut analysis = analysis();
        analysis.edges.push(EdgeAssertion {
            source: "db.dbo.orders.amount".to_string(),
            target: "db.dbo.orders.amount".to_string(),
            kind: "direct".to_string(),
            description: None,
            line: Some(9),
            confidence: 1.0,
        });
        analysis.edges.push(EdgeAssertion {
            source: "db.dbo.orders.amount".to_string(),
            target: "db.dbo.nowhere.x".to_string(),
            kind: "direct".to_string(),
            description: None,
            line: None,
            confidence: 1.0,
        });
        analysis.edges.push(EdgeAssertion {
            source: "db.dbo.orders.amount".to_string(),
            target: "db.dbo.v_sales.total".to_string(),
            kind: "pivot".to_string(),
            description: None,
            line: None,
            confidence: 1.0,
        });

        let summary = ingest(&store, &analysis, &Config::default()).unwrap();

        assert_eq!(summary.status, RunStatus::PartialSuccess);
        assert_eq!(summary.edges_written, 1);
        assert_eq!(summary.rejected, 3);
        let warnings = store.run_warnings(summary.run_id).unwrap();
        assert_eq!(
            warnings.iter().filter(|w| w.kind == REJECTED_EDGE).count(),
            3
        );
        assert!(warnings.iter().any(|w| w.line == Some(9)));
    }

    #[test]
    fn unknown_and_weak_edges_count_as_low_certainty() {
        let (_dir, store) = temp_store();
        let mut analysis = analysis();
        analysis.nodes.push(NodeSpec::column("db", "dbo", "v_sales", "region").into());
        analysis.nodes.push(NodeSpec::column("db", "dbo", "v_sales", "note").into());
        analysis.edges.push(EdgeAssertion {
            source: "db.dbo.orders.amount".to_string(),
            target: "db.dbo.v_sales.region".to_string(),
            kind: "unknown".to_string(),
            description: None,
            line: None,
            confidence: 1.0,
        });
        analysis.edges.push(EdgeAssertion {
            source: "db.dbo.orders.amount".to_string(),
            target: "db.dbo.v_sales.note".to_string(),
            kind: "direct".to_string(),
            description: None,
            line: None,
            confidence: 0.2,
        });

        let summary = ingest(&store, &analysis, &Config::default()).unwrap();

        assert_eq!(summary.edges_written, 3);
        assert_eq!(summary.low_certainty_edges, 2);
    }

    #[test]
    fn unknown_node_kind_rejects_only_that_declaration() {
        let (_dir, store) = temp_store();
        let analysis: ObjectAnalysis = serde_json::from_str(
            r#"{
                "producer": {"kind": "VIEW", "database": "db", "schema": "dbo", "object": "v_sales"},
                "nodes": [
                    {"kind": "column", "database": "db", "schema": "dbo", "object": "orders", "column": "amount"},
                    {"kind": "Column", "database": "db", "schema": "dbo", "object": "v_sales", "column": "total"},
                    {"kind": "synonym", "database": "db", "schema": "dbo", "object": "orders_syn"}
                ],
                "edges": [
                    {"source": "db.dbo.orders.amount", "target": "db.dbo.v_sales.total", "kind": "direct"}
                ]
            }"#,
        )
        .expect("analysis with an unknown node kind should still parse");

        let summary = ingest(&store, &analysis, &Config::default()).unwrap();

        assert_eq!(summary.status, RunStatus::PartialSuccess);
        assert_eq!(summary.edges_written, 1);
        assert_eq!(summary.rejected, 1);
        let warnings = store.run_warnings(summary.run_id).unwrap();
        let rejected: Vec<_> = warnings.iter().filter(|w| w.kind == REJECTED_NODE).collect();
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].message.contains("db.dbo.orders_syn"));
        assert!(rejected[0].message.contains("synonym"));
        // producer, two columns; no synonym node
        assert_eq!(store.list_nodes(true).unwrap().len(), 3);
    }

    #[test]
    fn unknown_producer_kind_fails_the_run() {
        let (_dir, store) = temp_store();
        let mut analysis = analysis();
        analysis.producer.kind = "package".to_string();

        let summary = ingest(&store, &analysis, &Config::default()).unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert!(summary.error.as_deref().is_some_and(|e| e.contains("package")));
        assert!(store.list_nodes(true).unwrap().is_empty());
    }

    #[test]
    fn invalid_producer_fails_the_run() {
        let (_dir, store) = temp_store();
        let mut analysis = analysis();
        analysis.producer.object = String::new();

        let summary = ingest(&store, &analysis, &Config::default()).unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert!(summary.error.is_some());
        assert!(store.list_nodes(true).unwrap().is_empty());
        let run = store.get_run(summary.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }
}
