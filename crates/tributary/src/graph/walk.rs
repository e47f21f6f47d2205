//! Lazy breadth-first lineage walk.

use std::collections::VecDeque;

use tracing::trace;

use super::{Direction, LineageSource, LineageStep};
use crate::error::Result;
use crate::types::Node;

/// A node waiting to be expanded, with the path that reached it.
#[derive(Debug)]
struct Frontier {
    node: Node,
    depth: u32,
    confidence: f64,
    path: Vec<String>,
}

/// Iterator over the steps of a lineage walk.
///
/// Steps come out in non-decreasing depth order. Within one expansion,
/// neighbours are ordered by qualified name. The source is queried once per
/// expanded node, only when the caller asks for more steps than are
/// already buffered. After an error the walk yields that error and ends.
pub struct LineageWalk<'a, S: LineageSource + ?Sized> {
    source: &'a S,
    direction: Direction,
    max_depth: u32,
    queue: VecDeque<Frontier>,
    ready: VecDeque<LineageStep>,
    finished: bool,
}

impl<'a, S: LineageSource + ?Sized> LineageWalk<'a, S> {
    /// Start a walk from `start`, following at most `max_depth` edges.
    ///
    /// The depth is used as given; callers clamp it to the configured limit.
    pub fn new(source: &'a S, start: Node, direction: Direction, max_depth: u32) -> Self {
        let path = vec![start.qualified_name()];
        let mut queue = VecDeque::new();
        queue.push_back(Frontier {
            node: start,
            depth: 0,
            confidence: 1.0,
            path,
        });

        Self {
            source,
            direction,
            max_depth,
            queue,
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Direction this walk follows.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Expand the next frontier entry into `ready`.
    ///
    /// Returns `Ok(false)` once the frontier is exhausted.
    fn expand_next(&mut self) -> Result<bool> {
        let Some(frontier) = self.queue.pop_front() else {
            return Ok(false);
        };
        if frontier.depth >= self.max_depth {
            return Ok(true);
        }

        let hops = self.source.hops(frontier.node.id, self.direction)?;
        trace!(
            node = %frontier.node.qualified_name(),
            depth = frontier.depth,
            neighbours = hops.len(),
            "Expanded lineage node"
        );

        let depth = frontier.depth + 1;
        for hop in hops {
            let confidence = frontier.confidence * hop.edge.confidence;
            let mut path = frontier.path.clone();
            path.push(hop.node.qualified_name());

            let (source, target) = match self.direction {
                Direction::Downstream => (frontier.node.clone(), hop.node.clone()),
                Direction::Upstream => (hop.node.clone(), frontier.node.clone()),
            };

            self.ready.push_back(LineageStep {
                source,
                target,
                kind: hop.edge.kind,
                producer: hop.producer,
                edge_id: hop.edge.id,
                edge_confidence: hop.edge.confidence,
                cumulative_confidence: confidence,
                depth,
                path: path.clone(),
                direction: self.direction,
            });

            if depth < self.max_depth {
                self.queue.push_back(Frontier {
                    node: hop.node,
                    depth,
                    confidence,
                    path,
                });
            }
        }

        Ok(true)
    }
}

impl<S: LineageSource + ?Sized> Iterator for LineageWalk<'_, S> {
    type Item = Result<LineageStep>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(step) = self.ready.pop_front() {
                return Some(Ok(step));
            }
            if self.finished {
                return None;
            }
            match self.expand_next() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    self.queue.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;
    use crate::error::Error;
    use crate::graph::Hop;
    use crate::types::{Edge, EdgeId, NodeId, NodeKind, TransformKind};

    /// In-memory graph: nodes by id, edges as (source, target, confidence).
    #[derive(Default)]
    struct MemoryGraph {
        nodes: HashMap<NodeId, Node>,
        edges: Vec<Edge>,
        fail_on: Option<NodeId>,
        queries: AtomicUsize,
    }

    impl MemoryGraph {
        fn node(&mut self, id: i64, name: &str) -> Node {
            let now = Utc::now();
            let node = Node {
                id: NodeId(id),
                kind: NodeKind::Column,
                database: "db".to_string(),
                schema: "dbo".to_string(),
                object: "t".to_string(),
                column: Some(name.to_string()),
                data_type: None,
                nullable: None,
                active: true,
                created_at: now,
                updated_at: now,
            };
            self.nodes.insert(node.id, node.clone());
            node
        }

        fn edge(&mut self, source: i64, target: i64, confidence: f64) {
            let now = Utc::now();
            let id = i64::try_from(self.edges.len()).unwrap() + 1;
            self.edges.push(Edge {
                id: EdgeId(id),
                source: NodeId(source),
                target: NodeId(target),
                kind: TransformKind::Direct,
                producer: None,
                description: None,
                line: None,
                confidence,
                active: true,
                provisional: false,
                created_at: now,
                updated_at: now,
            });
        }
    }

    impl LineageSource for MemoryGraph {
        fn hops(&self, node: NodeId, direction: Direction) -> Result<Vec<Hop>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(node) {
                return Err(Error::Internal("connection lost".to_string()));
            }
            let mut hops: Vec<Hop> = self
                .edges
                .iter()
                .filter_map(|edge| {
                    let far = match direction {
                        Direction::Downstream if edge.source == node => edge.target,
                        Direction::Upstream if edge.target == node => edge.source,
                        _ => return None,
                    };
                    Some(Hop {
                        edge: edge.clone(),
                        node: self.nodes[&far].clone(),
                        producer: None,
                    })
                })
                .collect();
            hops.sort_by_key(|h| h.node.qualified_name());
            Ok(hops)
        }

        fn active_incoming_count(&self, node: NodeId) -> Result<usize> {
            Ok(self.edges.iter().filter(|e| e.target == node).count())
        }
    }

    fn reached_names(steps: &[LineageStep]) -> Vec<String> {
        steps
            .iter()
            .map(|s| s.reached().column.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn zero_depth_yields_nothing() {
        let mut graph = MemoryGraph::default();
        let a = graph.node(1, "a");
        graph.node(2, "b");
        graph.edge(1, 2, 1.0);

        let steps: Vec<_> = LineageWalk::new(&graph, a, Direction::Downstream, 0).collect();

        assert!(steps.is_empty());
        assert_eq!(graph.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn breadth_first_order_with_sorted_neighbours() {
        let mut graph = MemoryGraph::default();
        let a = graph.node(1, "a");
        graph.node(2, "z");
        graph.node(3, "m");
        graph.node(4, "deep");
        graph.edge(1, 2, 1.0);
        graph.edge(1, 3, 1.0);
        graph.edge(2, 4, 1.0);

        let steps: Vec<_> = LineageWalk::new(&graph, a, Direction::Downstream, 5)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(reached_names(&steps), vec!["m", "z", "deep"]);
        assert_eq!(
            steps.iter().map(|s| s.depth).collect::<Vec<_>>(),
            vec![1, 1, 2]
        );
        assert_eq!(steps[2].path_description(), "db.dbo.t.a -> db.dbo.t.z -> db.dbo.t.deep");
    }

    #[test]
    fn upstream_steps_keep_edge_orientation() {
        let mut graph = MemoryGraph::default();
        graph.node(1, "a");
        let b = graph.node(2, "b");
        graph.edge(1, 2, 0.5);

        let steps: Vec<_> = LineageWalk::new(&graph, b, Direction::Upstream, 3)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].source.id, NodeId(1));
        assert_eq!(steps[0].target.id, NodeId(2));
        assert_eq!(steps[0].reached().id, NodeId(1));
        assert_eq!(steps[0].path_description(), "db.dbo.t.b <- db.dbo.t.a");
    }

    #[test]
    fn cycle_is_truncated_at_max_depth() {
        let mut graph = MemoryGraph::default();
        let a = graph.node(1, "a");
        graph.node(2, "b");
        graph.edge(1, 2, 1.0);
        graph.edge(2, 1, 1.0);

        let steps: Vec<_> = LineageWalk::new(&graph, a, Direction::Downstream, 4)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(steps.len(), 4);
        assert_eq!(reached_names(&steps), vec!["b", "a", "b", "a"]);
        assert!(steps.iter().all(|s| s.depth <= 4));
    }

    #[test]
    fn diamond_yields_converging_node_once_per_path() {
        let mut graph = MemoryGraph::default();
        let a = graph.node(1, "a");
        graph.node(2, "left");
        graph.node(3, "right");
        graph.node(4, "sink");
        graph.edge(1, 2, 0.5);
        graph.edge(1, 3, 1.0);
        graph.edge(2, 4, 1.0);
        graph.edge(3, 4, 0.8);

        let steps: Vec<_> = LineageWalk::new(&graph, a, Direction::Downstream, 5)
            .collect::<Result<_>>()
            .unwrap();

        let sinks: Vec<_> = steps.iter().filter(|s| s.reached().id == NodeId(4)).collect();
        assert_eq!(sinks.len(), 2);
        assert!((sinks[0].cumulative_confidence - 0.5).abs() < 1e-9);
        assert!((sinks[1].cumulative_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn walk_is_lazy() {
        let mut graph = MemoryGraph::default();
        let a = graph.node(1, "a");
        for id in 2..6 {
            graph.node(id, &format!("n{id}"));
            graph.edge(id - 1, id, 1.0);
        }

        let mut walk = LineageWalk::new(&graph, a, Direction::Downstream, 10);
        walk.next().unwrap().unwrap();

        assert_eq!(graph.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_is_yielded_once_then_walk_ends() {
        let mut graph = MemoryGraph::default();
        let a = graph.node(1, "a");
        graph.node(2, "b");
        graph.node(3, "c");
        graph.edge(1, 2, 1.0);
        graph.edge(2, 3, 1.0);
        graph.fail_on = Some(NodeId(2));

        let mut walk = LineageWalk::new(&graph, a, Direction::Downstream, 5);

        assert!(walk.next().unwrap().is_ok());
        assert!(matches!(walk.next(), Some(Err(Error::Internal(_)))));
        assert!(walk.next().is_none());
    }

    proptest! {
        #[test]
        fn cumulative_confidence_is_product_of_path(
            confidences in prop::collection::vec(0.0f64..=1.0, 1..12)
        ) {
            let mut graph = MemoryGraph::default();
            let start = graph.node(0, "n0");
            for (i, confidence) in confidences.iter().enumerate() {
                let id = i64::try_from(i).unwrap() + 1;
                graph.node(id, &format!("n{id}"));
                graph.edge(id - 1, id, *confidence);
            }
            let depth = u32::try_from(confidences.len()).unwrap();

            let steps: Vec<_> = LineageWalk::new(&graph, start, Direction::Downstream, depth)
                .collect::<Result<_>>()
                .unwrap();

            prop_assert_eq!(steps.len(), confidences.len());
            let mut product = 1.0;
            let mut minimum = 1.0f64;
            for (step, confidence) in steps.iter().zip(&confidences) {
                product *= confidence;
                minimum = minimum.min(*confidence);
                prop_assert!((step.cumulative_confidence - product).abs() < 1e-12);
                prop_assert!(step.cumulative_confidence <= minimum + 1e-12);
            }
        }

        #[test]
        fn steps_never_exceed_max_depth(chain in 1usize..10, max_depth in 0u32..12) {
            let mut graph = MemoryGraph::default();
            let start = graph.node(0, "n0");
            for i in 1..=chain {
                let id = i64::try_from(i).unwrap();
                graph.node(id, &format!("n{id}"));
                graph.edge(id - 1, id, 1.0);
            }
            // Close the loop so the walk can only stop at the bound.
            graph.edge(i64::try_from(chain).unwrap(), 0, 1.0);

            let steps: Vec<_> = LineageWalk::new(&graph, start, Direction::Downstream, max_depth)
                .collect::<Result<_>>()
                .unwrap();

            prop_assert_eq!(steps.len(), max_depth as usize);
            prop_assert!(steps.iter().all(|s| s.depth <= max_depth));
        }
    }
}
