//! Impact and origin analysis built on lineage walks.
//!
//! Both reports consume a full walk and summarize it. A node with no
//! lineage in the requested direction produces empty collections, never an
//! error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::graph::{Direction, LineageSource, LineageStep, LineageWalk};
use crate::types::{Node, NodeId, NodeKind};

/// A node reached by a walk, deduplicated across paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReachedNode {
    /// The node
    pub node: Node,
    /// Fewest hops along any path
    pub min_depth: u32,
    /// Highest cumulative confidence along any path
    pub max_confidence: f64,
}

/// A producing object whose edges carry impact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectImpact {
    /// The producing object
    pub producer: Node,
    /// Distinct edges of this producer crossed by the walk
    pub affected_edges: usize,
}

/// Everything downstream of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactReport {
    /// Node being changed
    pub target: Node,
    /// Depth bound used
    pub max_depth: u32,
    /// Distinct columns reached at each depth; depths reaching only
    /// object-level nodes are absent
    pub impacted_columns_by_depth: BTreeMap<u32, usize>,
    /// Distinct nodes reached, ordered by depth then name
    pub impacted: Vec<ReachedNode>,
    /// Producing objects, most affected edges first
    pub impacted_objects: Vec<ObjectImpact>,
    /// Every step of the walk, in walk order
    pub steps: Vec<LineageStep>,
}

impl ImpactReport {
    /// Whether nothing is downstream of the target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Where a node's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginReport {
    /// Node being traced
    pub target: Node,
    /// Depth bound used
    pub max_depth: u32,
    /// Reached nodes with no active upstream lineage, ordered by depth then name
    pub true_sources: Vec<ReachedNode>,
    /// Every step of the walk, in walk order
    pub chain: Vec<LineageStep>,
}

fn collect_reached<'a>(steps: impl IntoIterator<Item = &'a LineageStep>) -> Vec<ReachedNode> {
    let mut reached: HashMap<NodeId, ReachedNode> = HashMap::new();
    for step in steps {
        let node = step.reached();
        reached
            .entry(node.id)
            .and_modify(|r| {
                r.min_depth = r.min_depth.min(step.depth);
                r.max_confidence = r.max_confidence.max(step.cumulative_confidence);
            })
            .or_insert_with(|| ReachedNode {
                node: node.clone(),
                min_depth: step.depth,
                max_confidence: step.cumulative_confidence,
            });
    }

    let mut reached: Vec<_> = reached.into_values().collect();
    reached.sort_by(|a, b| {
        a.min_depth
            .cmp(&b.min_depth)
            .then_with(|| a.node.qualified_name().cmp(&b.node.qualified_name()))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    reached
}

/// Walk downstream from `target` and summarize what would be affected.
pub fn analyze_impact<S: LineageSource + ?Sized>(
    source: &S,
    target: Node,
    max_depth: u32,
) -> Result<ImpactReport> {
    let steps = LineageWalk::new(source, target.clone(), Direction::Downstream, max_depth)
        .collect::<Result<Vec<_>>>()?;

    let mut by_depth: BTreeMap<u32, BTreeSet<NodeId>> = BTreeMap::new();
    let mut by_producer: HashMap<NodeId, (Node, BTreeSet<i64>)> = HashMap::new();
    for step in &steps {
        let reached = step.reached();
        if reached.kind == NodeKind::Column {
            by_depth.entry(step.depth).or_default().insert(reached.id);
        }
        if let Some(producer) = &step.producer {
            by_producer
                .entry(producer.id)
                .or_insert_with(|| (producer.clone(), BTreeSet::new()))
                .1
                .insert(step.edge_id.as_i64());
        }
    }

    let mut impacted_objects: Vec<ObjectImpact> = by_producer
        .into_values()
        .map(|(producer, edges)| ObjectImpact {
            producer,
            affected_edges: edges.len(),
        })
        .collect();
    impacted_objects.sort_by(|a, b| {
        b.affected_edges
            .cmp(&a.affected_edges)
            .then_with(|| a.producer.qualified_name().cmp(&b.producer.qualified_name()))
    });

    debug!(
        target = %target.qualified_name(),
        steps = steps.len(),
        objects = impacted_objects.len(),
        "Impact analysis complete"
    );

    Ok(ImpactReport {
        impacted_columns_by_depth: by_depth
            .into_iter()
            .map(|(depth, nodes)| (depth, nodes.len()))
            .collect(),
        impacted: collect_reached(&steps),
        impacted_objects,
        steps,
        target,
        max_depth,
    })
}

/// Walk upstream from `target` and find its true sources.
///
/// A reached node is a true source when it has no active incoming edges. A
/// node cut off by the depth bound that still has upstream lineage is not.
pub fn trace_origin<S: LineageSource + ?Sized>(
    source: &S,
    target: Node,
    max_depth: u32,
) -> Result<OriginReport> {
    let chain = LineageWalk::new(source, target.clone(), Direction::Upstream, max_depth)
        .collect::<Result<Vec<_>>>()?;

    let mut incoming: HashMap<NodeId, usize> = HashMap::new();
    for step in &chain {
        let id = step.reached().id;
        if !incoming.contains_key(&id) {
            incoming.insert(id, source.active_incoming_count(id)?);
        }
    }

    let true_sources = collect_reached(
        chain
            .iter()
            .filter(|step| incoming.get(&step.reached().id) == Some(&0)),
    );

    debug!(
        target = %target.qualified_name(),
        steps = chain.len(),
        sources = true_sources.len(),
        "Origin trace complete"
    );

    Ok(OriginReport {
        target,
        max_depth,
        true_sources,
        chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::db::Store;
    use crate::types::{EdgeSpec, NodeSpec, TransformKind};

    fn column(store: &Store, object: &str, column: &str) -> Node {
        let id = store
            .upsert_node(&NodeSpec::column("db", "dbo", object, column))
            .expect("should upsert column");
        store.get_node(id).unwrap().expect("node should exist")
    }

    fn routine(store: &Store, name: &str) -> NodeId {
        store
            .upsert_node(&NodeSpec::object(NodeKind::Routine, "db", "dbo", name))
            .expect("should upsert routine")
    }

    #[test]
    fn impact_counts_distinct_columns_per_depth_and_ranks_producers() {
        let (_dir, store) = temp_store();
        let a = column(&store, "t1", "a");
        let b = column(&store, "t2", "b");
        let c = column(&store, "t2", "c");
        let d = column(&store, "t3", "d");
        let busy = routine(&store, "busy");
        let quiet = routine(&store, "quiet");
        for (s, t, p) in [(&a, &b, busy), (&a, &c, busy), (&b, &d, quiet), (&c, &d, busy)] {
            store
                .upsert_edge(&EdgeSpec::new(s.id, t.id, TransformKind::Direct).produced_by(p))
                .unwrap();
        }

        let report = analyze_impact(&store, a, 5).unwrap();

        assert_eq!(report.impacted_columns_by_depth.get(&1), Some(&2));
        // d is reached twice at depth 2 but counted once
        assert_eq!(report.impacted_columns_by_depth.get(&2), Some(&1));
        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.impacted.len(), 3);
        assert_eq!(report.impacted_objects[0].producer.id, busy);
        assert_eq!(report.impacted_objects[0].affected_edges, 3);
        assert_eq!(report.impacted_objects[1].producer.id, quiet);
    }

    #[test]
    fn object_level_nodes_are_not_counted_as_impacted_columns() {
        let (_dir, store) = temp_store();
        let a = column(&store, "t1", "a");
        let b = column(&store, "t2", "b");
        let table = store
            .upsert_node(&NodeSpec::object(NodeKind::Table, "db", "dbo", "archive"))
            .unwrap();
        let refresh = routine(&store, "refresh");
        for target in [table, refresh] {
            store
                .upsert_edge(&EdgeSpec::new(a.id, target, TransformKind::Direct))
                .unwrap();
        }
        store
            .upsert_edge(&EdgeSpec::new(table, b.id, TransformKind::Direct))
            .unwrap();

        let report = analyze_impact(&store, a, 5).unwrap();

        assert_eq!(report.impacted_columns_by_depth.get(&1), None);
        assert_eq!(report.impacted_columns_by_depth.get(&2), Some(&1));
        // object-level nodes still appear among the reached nodes
        assert_eq!(report.impacted.len(), 3);
    }

    #[test]
    fn impact_without_downstream_is_empty() {
        let (_dir, store) = temp_store();
        let lonely = column(&store, "t", "lonely");

        let report = analyze_impact(&store, lonely, 5).unwrap();

        assert!(report.is_empty());
        assert!(report.impacted_columns_by_depth.is_empty());
        assert!(report.impacted_objects.is_empty());
    }

    #[test]
    fn origin_reports_only_nodes_without_upstream() {
        let (_dir, store) = temp_store();
        let raw = column(&store, "raw", "amount");
        let fx = column(&store, "fx", "rate");
        let staged = column(&store, "stage", "amount");
        let report_col = column(&store, "report", "total");
        store
            .upsert_edge(&EdgeSpec::new(raw.id, staged.id, TransformKind::Direct).with_confidence(0.9))
            .unwrap();
        store
            .upsert_edge(&EdgeSpec::new(fx.id, report_col.id, TransformKind::Arithmetic))
            .unwrap();
        store
            .upsert_edge(
                &EdgeSpec::new(staged.id, report_col.id, TransformKind::Arithmetic)
                    .with_confidence(0.5),
            )
            .unwrap();

        let report = trace_origin(&store, report_col, 5).unwrap();

        let sources: Vec<_> = report
            .true_sources
            .iter()
            .map(|s| s.node.qualified_name())
            .collect();
        assert_eq!(sources, vec!["db.dbo.fx.rate", "db.dbo.raw.amount"]);
        assert_eq!(report.true_sources[0].min_depth, 1);
        assert_eq!(report.true_sources[1].min_depth, 2);
        assert!((report.true_sources[1].max_confidence - 0.45).abs() < 1e-9);
        assert_eq!(report.chain.len(), 3);
    }

    #[test]
    fn origin_truncated_by_depth_has_no_false_sources() {
        let (_dir, store) = temp_store();
        let a = column(&store, "t1", "a");
        let b = column(&store, "t2", "b");
        let c = column(&store, "t3", "c");
        store
            .upsert_edge(&EdgeSpec::new(a.id, b.id, TransformKind::Direct))
            .unwrap();
        store
            .upsert_edge(&EdgeSpec::new(b.id, c.id, TransformKind::Direct))
            .unwrap();

        let report = trace_origin(&store, c, 1).unwrap();

        assert_eq!(report.chain.len(), 1);
        assert!(report.true_sources.is_empty());
    }
}
