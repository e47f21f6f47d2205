//! # Tributary: Data Lineage Catalog and Traversal Engine
//!
//! Tributary records which columns, tables and routines derive from which,
//! as asserted by static analysis of views and stored procedures, and
//! answers lineage questions over that record in `SQLite`.
//!
//! ## Design Philosophy
//!
//! - **Catalog, not analyzer** - Analyzers parse SQL; Tributary stores and walks their output
//! - **Soft deletes** - Vanished nodes and stale edges are deactivated, never silently lost
//! - **One object, one transaction** - A producer's lineage is replaced all-or-nothing
//! - **Facts with certainty** - Every edge carries a confidence, composed along paths
//!
//! ## Quick Start
//!
//! ```no_run
//! use tributary::{Config, NodeLocator, Tributary};
//!
//! let tributary = Tributary::open(Config::with_database(".tributary/lineage.db"))?;
//!
//! // What breaks if orders.amount changes?
//! let impact = tributary.analyze_impact(&NodeLocator::new("dbo", "orders").column("amount"), None)?;
//! for (depth, count) in &impact.impacted_columns_by_depth {
//!     println!("depth {depth}: {count} columns");
//! }
//!
//! // Where does the report total come from?
//! let origin = tributary.trace_origin(&NodeLocator::new("rpt", "sales").column("total"), Some(10))?;
//! println!("{} true sources", origin.true_sources.len());
//! # Ok::<(), tributary::Error>(())
//! ```

mod config;
mod db;
mod error;
mod export;
mod graph;
mod impact;
mod ingest;
mod reconcile;
mod types;

pub use config::{
    AnalysisConfig, Config, StorageConfig, TraversalConfig, CONFIG_FILE_NAME, DATABASE_FILE_NAME,
    TRIBUTARY_DIR_NAME,
};
pub use db::Store;
pub use error::{Error, Result};
pub use export::{export_graph, GraphEdge, GraphNode, LineageExport};
pub use graph::{Direction, Hop, LineageSource, LineageStep, LineageWalk};
pub use impact::{analyze_impact, trace_origin, ImpactReport, ObjectImpact, OriginReport, ReachedNode};
pub use ingest::{
    ingest, ingest_batch, BatchError, BatchSummary, EdgeAssertion, NodeDeclaration, ObjectAnalysis,
    RunSummary, REJECTED_EDGE, REJECTED_NODE,
};
pub use reconcile::{deactivate_missing, sync, wipe, LiveColumn, LiveObject, SyncReport, WipeReport};
pub use types::{
    qualified_name, DatabaseStats, Edge, EdgeId, EdgeSpec, Node, NodeId, NodeKind, NodeLocator,
    NodeSpec, Run, RunId, RunRecord, RunStatus, RunWarning, TransformKind,
};

use std::path::Path;

use tracing::debug;

/// Lineage catalog and query interface.
///
/// `Tributary` is the main entry point. It owns one `SQLite` connection
/// (behind a mutex, so the facade is `Send + Sync` and can be shared behind
/// an `Arc`) and the configuration that bounds traversals and classifies
/// runs.
pub struct Tributary {
    store: Store,
    config: Config,
}

#[allow(clippy::missing_errors_doc)]
impl Tributary {
    /// Open or create the database named by `config`.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Store::open(&config.database_path, &config.storage)?;
        debug!(path = %config.database_path.display(), "Opened lineage database");
        Ok(Self { store, config })
    }

    /// Open or create a database at `path` with default settings.
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::with_database(path))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.store.path()
    }

    /// Underlying store, for callers that drive traversal or the ledger directly.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    // === Catalog ===

    /// Find-or-create a node. Repeated calls with the same identity return the same ID.
    pub fn upsert_node(&self, spec: &NodeSpec) -> Result<NodeId> {
        self.store.upsert_node(spec)
    }

    /// Get a node by ID, active or not.
    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        self.store.get_node(id)
    }

    /// Active nodes matching a locator.
    pub fn find_nodes(&self, locator: &NodeLocator) -> Result<Vec<Node>> {
        self.store.find_nodes(locator)
    }

    /// Resolve a locator to exactly one active node.
    pub fn resolve(&self, locator: &NodeLocator) -> Result<Node> {
        self.store.resolve(locator)
    }

    /// List nodes, optionally including deactivated ones.
    pub fn list_nodes(&self, include_inactive: bool) -> Result<Vec<Node>> {
        self.store.list_nodes(include_inactive)
    }

    // === Edges ===

    /// Insert or update an edge keyed by (source, target, producer).
    pub fn upsert_edge(&self, spec: &EdgeSpec) -> Result<EdgeId> {
        self.store.upsert_edge(spec)
    }

    /// Get an edge by ID, active or not.
    pub fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        self.store.get_edge(id)
    }

    /// Every edge asserted by a producing object.
    pub fn edges_for_producer(&self, producer: NodeId) -> Result<Vec<Edge>> {
        self.store.edges_for_producer(producer)
    }

    /// Active edges into a node.
    pub fn incoming(&self, node: NodeId) -> Result<Vec<Edge>> {
        self.store.incoming(node)
    }

    /// Active edges out of a node.
    pub fn outgoing(&self, node: NodeId) -> Result<Vec<Edge>> {
        self.store.outgoing(node)
    }

    // === Traversal ===

    /// Lazily walk upstream from `node`, towards where its value comes from.
    ///
    /// `max_depth` defaults to the configured default and is clamped to the
    /// configured limit.
    pub fn upstream(&self, node: NodeId, max_depth: Option<u32>) -> Result<LineageWalk<'_, Store>> {
        self.walk(node, Direction::Upstream, max_depth)
    }

    /// Lazily walk downstream from `node`, towards everything derived from it.
    pub fn downstream(&self, node: NodeId, max_depth: Option<u32>) -> Result<LineageWalk<'_, Store>> {
        self.walk(node, Direction::Downstream, max_depth)
    }

    fn walk(
        &self,
        node: NodeId,
        direction: Direction,
        max_depth: Option<u32>,
    ) -> Result<LineageWalk<'_, Store>> {
        let start = self.active_node(node)?;
        let depth = self.depth(max_depth);
        Ok(LineageWalk::new(&self.store, start, direction, depth))
    }

    fn active_node(&self, id: NodeId) -> Result<Node> {
        self.store
            .get_node(id)?
            .filter(|node| node.active)
            .ok_or_else(|| Error::NodeNotFound(format!("node id {id}")))
    }

    fn depth(&self, requested: Option<u32>) -> u32 {
        self.config
            .clamp_depth(requested.unwrap_or(self.config.traversal.default_max_depth))
    }

    // === Impact analysis ===

    /// Everything downstream of the located node.
    pub fn analyze_impact(&self, locator: &NodeLocator, max_depth: Option<u32>) -> Result<ImpactReport> {
        let target = self.store.resolve(locator)?;
        analyze_impact(&self.store, target, self.depth(max_depth))
    }

    /// True sources and the full upstream chain of the located node.
    pub fn trace_origin(&self, locator: &NodeLocator, max_depth: Option<u32>) -> Result<OriginReport> {
        let target = self.store.resolve(locator)?;
        trace_origin(&self.store, target, self.depth(max_depth))
    }

    // === Ingestion and run ledger ===

    /// Ingest one producing object's analysis and record the run.
    pub fn ingest(&self, analysis: &ObjectAnalysis) -> Result<RunSummary> {
        ingest(&self.store, analysis, &self.config)
    }

    /// Ingest many objects in parallel, one connection per worker.
    #[must_use]
    pub fn ingest_batch(&self, analyses: &[ObjectAnalysis]) -> BatchSummary {
        ingest_batch(self.store.path(), &self.config, analyses)
    }

    /// Append a run to the ledger.
    pub fn record_run(&self, record: &RunRecord) -> Result<RunId> {
        self.store.record_run(record)
    }

    /// Get a run by ID.
    pub fn get_run(&self, id: RunId) -> Result<Option<Run>> {
        self.store.get_run(id)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        self.store.list_runs(limit)
    }

    /// Warnings recorded for a run.
    pub fn run_warnings(&self, id: RunId) -> Result<Vec<RunWarning>> {
        self.store.run_warnings(id)
    }

    // === Reconciliation ===

    /// Align the catalog with a live schema listing.
    pub fn sync(&self, live: &[LiveObject]) -> Result<SyncReport> {
        sync(&self.store, live)
    }

    /// Deactivate schema objects absent from a live listing, inserting nothing.
    pub fn deactivate_missing(&self, live: &[LiveObject]) -> Result<usize> {
        deactivate_missing(&self.store, live)
    }

    /// Delete all lineage data when `confirmed`; otherwise do nothing.
    pub fn wipe(&self, confirmed: bool) -> Result<WipeReport> {
        wipe(&self.store, confirmed)
    }

    // === Export and maintenance ===

    /// Export nodes and edges for visualization.
    pub fn export_graph(&self, include_inactive: bool) -> Result<LineageExport> {
        export_graph(&self.store, include_inactive)
    }

    /// Catalog, edge and ledger counts.
    pub fn stats(&self) -> Result<DatabaseStats> {
        self.store.get_stats()
    }

    /// Refresh `SQLite` query planner statistics.
    pub fn analyze(&self) -> Result<()> {
        self.store.analyze()
    }

    /// Reclaim space in the database file.
    pub fn vacuum(&self) -> Result<()> {
        self.store.vacuum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_tributary() -> (tempfile::TempDir, Tributary) {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let tributary =
            Tributary::open_path(&dir.path().join("lineage.db")).expect("should open database");
        (dir, tributary)
    }

    #[test]
    fn tributary_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Tributary>();
    }

    #[test]
    fn walk_from_missing_or_inactive_node_is_not_found() {
        let (_dir, tributary) = temp_tributary();
        assert!(matches!(
            tributary.downstream(NodeId(42), None),
            Err(Error::NodeNotFound(_))
        ));

        let id = tributary
            .upsert_node(&NodeSpec::object(NodeKind::Table, "db", "dbo", "t"))
            .unwrap();
        tributary.deactivate_missing(&[]).unwrap();

        assert!(matches!(
            tributary.upstream(id, None),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn requested_depth_is_clamped_to_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_database(dir.path().join("lineage.db"));
        config.traversal.default_max_depth = 2;
        config.traversal.max_depth_limit = 3;
        let tributary = Tributary::open(config).unwrap();

        let ids: Vec<NodeId> = (0..6)
            .map(|i| {
                tributary
                    .upsert_node(&NodeSpec::column("db", "dbo", format!("t{i}"), "c"))
                    .unwrap()
            })
            .collect();
        for pair in ids.windows(2) {
            tributary
                .upsert_edge(&EdgeSpec::new(pair[0], pair[1], TransformKind::Direct))
                .unwrap();
        }

        assert_eq!(tributary.downstream(ids[0], None).unwrap().count(), 2);
        assert_eq!(tributary.downstream(ids[0], Some(100)).unwrap().count(), 3);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let mut config = Config::with_database("unused.db");
        config.storage.upsert_retries = 0;

        assert!(matches!(Tributary::open(config), Err(Error::Config(_))));
    }
}
