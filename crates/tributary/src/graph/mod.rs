//! Lineage traversal.
//!
//! This module provides:
//! - Upstream walks (where does this value come from?)
//! - Downstream walks (what does this value feed?)
//!
//! ## Design
//!
//! - `LineageSource` is the seam between traversal and storage: one
//!   neighbour query per expansion, nothing held between expansions
//! - `LineageWalk` is a lazy breadth-first iterator with an explicit depth
//!   counter, so traversal cost is proportional to what the caller consumes
//! - No visited set: a cycle is walked until the depth bound, and a node
//!   reachable along two paths is reported once per path

mod types;
mod walk;

pub use types::{Direction, Hop, LineageStep};
pub use walk::LineageWalk;

use crate::db::Store;
use crate::error::Result;
use crate::types::NodeId;

/// Read access to the lineage graph, one expansion at a time.
pub trait LineageSource: Send + Sync {
    /// Active edges leaving `node` in `direction`, each paired with the
    /// active node at the far end. Ordered by the far node's qualified name.
    fn hops(&self, node: NodeId, direction: Direction) -> Result<Vec<Hop>>;

    /// Number of active edges into `node` from active nodes.
    fn active_incoming_count(&self, node: NodeId) -> Result<usize>;
}

impl LineageSource for Store {
    fn hops(&self, node: NodeId, direction: Direction) -> Result<Vec<Hop>> {
        Store::hops(self, node, direction)
    }

    fn active_incoming_count(&self, node: NodeId) -> Result<usize> {
        self.count_active_incoming(node)
    }
}
