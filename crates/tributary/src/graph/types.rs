//! Types for lineage traversal.

use std::fmt;

use serde::Serialize;

use crate::types::{Edge, EdgeId, Node, TransformKind};

/// Which way a walk follows edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From a target towards the sources it derives from
    Upstream,
    /// From a source towards the targets derived from it
    Downstream,
}

impl Direction {
    /// Separator used when rendering a path in this direction.
    #[must_use]
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Upstream => " <- ",
            Self::Downstream => " -> ",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        })
    }
}

/// One edge followed out of a node, as returned by a neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    /// The edge followed
    pub edge: Edge,
    /// The node at the far end of the edge
    pub node: Node,
    /// The object that asserted the edge, if any
    pub producer: Option<Node>,
}

/// A single step of a lineage walk.
///
/// `source` and `target` follow the edge's own orientation regardless of
/// the walk direction: on an upstream walk the node reached is `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageStep {
    /// Node the value is derived from
    pub source: Node,
    /// Node whose value is derived
    pub target: Node,
    /// Transformation applied along the edge
    pub kind: TransformKind,
    /// Object that asserted the edge
    pub producer: Option<Node>,
    /// The edge followed
    pub edge_id: EdgeId,
    /// Confidence of this edge alone
    pub edge_confidence: f64,
    /// Product of the edge confidences from the start node to here
    pub cumulative_confidence: f64,
    /// Hops from the start node, starting at 1
    pub depth: u32,
    /// Qualified names from the start node to the node reached
    pub path: Vec<String>,
    /// Direction of the walk that produced this step
    pub direction: Direction,
}

impl LineageStep {
    /// The node this step arrives at.
    #[must_use]
    pub fn reached(&self) -> &Node {
        match self.direction {
            Direction::Upstream => &self.source,
            Direction::Downstream => &self.target,
        }
    }

    /// The path rendered as `a -> b -> c` (or `a <- b <- c` upstream).
    #[must_use]
    pub fn path_description(&self) -> String {
        self.path.join(self.direction.arrow())
    }
}
