//! Whole-graph export for visualization tools.
//!
//! The export is a plain node and edge listing (serializable to JSON) that
//! can also be loaded into a `petgraph` graph and rendered as Graphviz DOT.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::db::Store;
use crate::error::Result;
use crate::types::{Edge, EdgeId, Node, NodeId, NodeKind, TransformKind};

/// Catalog nodes and the edges between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineageExport {
    /// Nodes ordered by qualified name
    pub nodes: Vec<Node>,
    /// Edges in insertion order, only between exported nodes
    pub edges: Vec<Edge>,
}

/// Node weight of the exported graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Catalog ID
    pub id: NodeId,
    /// Node kind
    pub kind: NodeKind,
    /// Qualified name
    pub name: String,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Edge weight of the exported graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    /// Edge ID
    pub id: EdgeId,
    /// Transformation kind
    pub kind: TransformKind,
    /// Edge confidence
    pub confidence: f64,
    /// Producing object
    pub producer: Option<NodeId>,
}

impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.kind, self.confidence)
    }
}

impl LineageExport {
    /// Build a directed graph with edges pointing from source to target.
    #[must_use]
    pub fn to_graph(&self) -> DiGraph<GraphNode, GraphEdge> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let idx = graph.add_node(GraphNode {
                id: node.id,
                kind: node.kind,
                name: node.qualified_name(),
            });
            index.insert(node.id, idx);
        }

        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(
                    from,
                    to,
                    GraphEdge {
                        id: edge.id,
                        kind: edge.kind,
                        confidence: edge.confidence,
                        producer: edge.producer,
                    },
                );
            }
        }

        graph
    }

    /// Render as Graphviz DOT.
    #[must_use]
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.to_graph()))
    }
}

/// Export the catalog, optionally including inactive nodes and edges.
pub fn export_graph(store: &Store, include_inactive: bool) -> Result<LineageExport> {
    let nodes = store.list_nodes(include_inactive)?;
    let exported: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
    let edges = store
        .list_edges(include_inactive)?
        .into_iter()
        .filter(|e| exported.contains(&e.source) && exported.contains(&e.target))
        .collect();

    Ok(LineageExport { nodes, edges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::types::{EdgeSpec, NodeSpec};

    #[test]
    fn graph_mirrors_active_catalog() {
        let (_dir, store) = temp_store();
        let a = store
            .upsert_node(&NodeSpec::column("db", "dbo", "t1", "a"))
            .unwrap();
        let b = store
            .upsert_node(&NodeSpec::column("db", "dbo", "t2", "b"))
            .unwrap();
        let gone = store
            .upsert_node(&NodeSpec::column("db", "dbo", "t3", "gone"))
            .unwrap();
        store
            .upsert_edge(&EdgeSpec::new(a, b, TransformKind::Aggregation).with_confidence(0.75))
            .unwrap();
        store
            .upsert_edge(&EdgeSpec::new(b, gone, TransformKind::Direct))
            .unwrap();
        store
            .connection()
            .unwrap()
            .execute("UPDATE nodes SET active = 0 WHERE id = ?1", [gone.as_i64()])
            .unwrap();

        let export = export_graph(&store, false).unwrap();
        let graph = export.to_graph();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        let dot = export.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("db.dbo.t1.a (column)"));
        assert!(dot.contains("aggregation 0.75"));

        let full = export_graph(&store, true).unwrap();
        assert_eq!(full.to_graph().edge_count(), 2);
    }
}
