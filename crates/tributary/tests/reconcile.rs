//! Integration tests for schema reconciliation, wipe and export.

use tempfile::TempDir;
use tributary::{
    EdgeAssertion, LiveColumn, LiveObject, NodeKind, NodeLocator, NodeSpec, ObjectAnalysis,
    SyncReport, Tributary,
};

fn temp_tributary() -> (TempDir, Tributary) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let tributary =
        Tributary::open_path(&dir.path().join("lineage.db")).expect("should open Tributary");
    (dir, tributary)
}

fn table(name: &str, columns: &[&str]) -> LiveObject {
    LiveObject {
        kind: NodeKind::Table,
        database: "hr".to_string(),
        schema: "dbo".to_string(),
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|c| LiveColumn {
                name: (*c).to_string(),
                data_type: Some("nvarchar(50)".to_string()),
                nullable: Some(true),
            })
            .collect(),
    }
}

/// A routine that stages `employees.name` through a CTE into `roster.name`.
fn staging_routine() -> ObjectAnalysis {
    let hop = |source: &str, target: &str| EdgeAssertion {
        source: source.to_string(),
        target: target.to_string(),
        kind: "direct".to_string(),
        description: None,
        line: None,
        confidence: 1.0,
    };
    ObjectAnalysis {
        producer: NodeSpec::object(NodeKind::Routine, "hr", "dbo", "build_roster").into(),
        nodes: vec![
            NodeSpec::column("hr", "dbo", "employees", "name").into(),
            NodeSpec::object(NodeKind::NamedSubquery, "hr", "dbo", "staged").into(),
            NodeSpec::column("hr", "dbo", "staged", "name").into(),
            NodeSpec::column("hr", "dbo", "roster", "name").into(),
        ],
        edges: vec![
            hop("hr.dbo.employees.name", "hr.dbo.staged.name"),
            hop("hr.dbo.staged.name", "hr.dbo.roster.name"),
        ],
        warnings: Vec::new(),
    }
}

// === Sync ===

#[test]
fn sync_keeps_transient_lineage_and_never_touches_edges() {
    let (_dir, tributary) = temp_tributary();
    tributary.ingest(&staging_routine()).unwrap();
    let live = vec![
        table("employees", &["name"]),
        table("roster", &["name"]),
        LiveObject {
            kind: NodeKind::Routine,
            columns: Vec::new(),
            ..table("build_roster", &[])
        },
    ];

    let first = tributary.sync(&live).unwrap();

    // Only the two table nodes are new; the CTE and its column are left alone
    assert_eq!(first, SyncReport { inserted: 2, deactivated: 0 });
    let origin = tributary
        .trace_origin(&NodeLocator::new("dbo", "roster").column("name"), None)
        .unwrap();
    assert_eq!(origin.chain.len(), 2);
    assert_eq!(tributary.sync(&live).unwrap(), SyncReport::default());
}

#[test]
fn dropped_table_is_deactivated_but_its_edges_remain() {
    let (_dir, tributary) = temp_tributary();
    tributary.ingest(&staging_routine()).unwrap();
    let edges_before = tributary.stats().unwrap().active_edges;
    let routine = LiveObject {
        kind: NodeKind::Routine,
        columns: Vec::new(),
        ..table("build_roster", &[])
    };

    let report = tributary
        .sync(&[table("employees", &["name"]), routine.clone()])
        .unwrap();

    assert_eq!(report.deactivated, 1);
    assert_eq!(tributary.stats().unwrap().active_edges, edges_before);
    assert!(matches!(
        tributary.trace_origin(&NodeLocator::new("dbo", "roster").column("name"), None),
        Err(tributary::Error::NodeNotFound(_))
    ));

    // The table comes back: same node, lineage visible again
    let restored = tributary
        .sync(&[
            table("employees", &["name"]),
            table("roster", &["name"]),
            routine,
        ])
        .unwrap();
    assert_eq!(restored, SyncReport { inserted: 2, deactivated: 0 });
    let origin = tributary
        .trace_origin(&NodeLocator::new("dbo", "roster").column("name"), None)
        .unwrap();
    assert_eq!(origin.true_sources.len(), 1);
    assert_eq!(
        origin.true_sources[0].node.qualified_name(),
        "hr.dbo.employees.name"
    );
}

#[test]
fn sync_refreshes_descriptive_attributes() {
    let (_dir, tributary) = temp_tributary();
    tributary.sync(&[table("employees", &["name"])]).unwrap();

    let mut changed = table("employees", &["name"]);
    changed.columns[0].data_type = Some("nvarchar(200)".to_string());
    let report = tributary.sync(&[changed]).unwrap();

    assert_eq!(report, SyncReport::default());
    let node = tributary
        .resolve(&NodeLocator::new("dbo", "employees").column("name"))
        .unwrap();
    assert_eq!(node.data_type.as_deref(), Some("nvarchar(200)"));
}

// === Wipe ===

#[test]
fn unconfirmed_wipe_changes_nothing() {
    let (_dir, tributary) = temp_tributary();
    tributary.ingest(&staging_routine()).unwrap();
    let before = tributary.stats().unwrap();

    let report = tributary.wipe(false).unwrap();

    assert!(!report.performed);
    assert!(!report.message.is_empty());
    assert_eq!(tributary.stats().unwrap(), before);
}

#[test]
fn confirmed_wipe_removes_everything() {
    let (_dir, tributary) = temp_tributary();
    tributary.ingest(&staging_routine()).unwrap();

    let report = tributary.wipe(true).unwrap();

    assert!(report.performed);
    assert_eq!(report.nodes, 5);
    assert_eq!(report.edges, 2);
    assert_eq!(report.runs, 1);
    let stats = tributary.stats().unwrap();
    assert_eq!(stats.active_nodes + stats.inactive_nodes, 0);
    assert!(stats.runs_by_status.is_empty());
    assert!(tributary.list_runs(10).unwrap().is_empty());
}

// === Export ===

#[test]
fn export_contains_catalog_and_renders_dot() {
    let (_dir, tributary) = temp_tributary();
    tributary.ingest(&staging_routine()).unwrap();

    let export = tributary.export_graph(false).unwrap();

    assert_eq!(export.nodes.len(), 5);
    assert_eq!(export.edges.len(), 2);
    let json = serde_json::to_value(&export).unwrap();
    assert_eq!(json["nodes"].as_array().map(Vec::len), Some(5));
    assert_eq!(json["edges"][0]["kind"], "direct");

    let dot = export.to_dot();
    assert!(dot.contains("hr.dbo.staged.name (column)"));
    assert!(dot.contains("->"));
}
