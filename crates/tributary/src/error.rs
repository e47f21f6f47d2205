//! Error types for Tributary operations.
//!
//! Errors fall into three groups:
//!
//! - **Validation**: rejected synchronously before anything is written
//!   (`InvalidKind`, `InvalidNode`, `SelfReference`, `ConfidenceOutOfRange`)
//! - **Lookup**: the requested node is not in the catalog (`NodeNotFound`,
//!   `AmbiguousNode`). A node that exists but has no edges is *not* an error.
//! - **Infrastructure**: database, I/O, serialization and configuration failures
//!
//! An unconfirmed wipe is reported through [`crate::WipeReport`], never as an error.

use thiserror::Error;

use crate::types::NodeId;

/// Result type for Tributary operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Tributary operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Analyzer input, schema listing or report (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested node is not in the catalog
    #[error("node not found: {0} (has lineage analysis been run for this object?)")]
    NodeNotFound(String),

    /// A locator matched more than one active node
    #[error("'{locator}' is ambiguous, it matches: {}", candidates.join(", "))]
    AmbiguousNode {
        /// The locator as given by the caller
        locator: String,
        /// Fully-qualified names of every match
        candidates: Vec<String>,
    },

    /// Unrecognized node or transformation kind
    #[error("invalid kind: '{0}'")]
    InvalidKind(String),

    /// Node declaration is missing a required identity part
    #[error("invalid node: {0}")]
    InvalidNode(String),

    /// An edge may not connect a node to itself
    #[error("edge source and target are the same node ({0})")]
    SelfReference(NodeId),

    /// Edge confidence must lie in `[0, 1]`
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    /// Internal invariant violated (e.g. poisoned lock)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` for input validation failures.
    ///
    /// During ingestion these reject a single assertion instead of failing
    /// the whole run.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidKind(_)
                | Self::InvalidNode(_)
                | Self::SelfReference(_)
                | Self::ConfidenceOutOfRange(_)
        )
    }
}
