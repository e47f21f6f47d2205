//! Domain types for the Tributary lineage catalog.
//!
//! These types represent the core domain model:
//! - **Entities**: `Node`, `Edge`, `Run`, `RunWarning` (stored in database)
//! - **Inputs**: `NodeSpec`, `EdgeSpec`, `NodeLocator` (mutation and lookup arguments)
//! - **Results**: `DatabaseStats` (query results)
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Kinds | Enum not String | Closed sets; parse failures become `InvalidKind` |
//! | Identity | Includes `kind` | A table and a routine may share a qualified name |
//! | qualified_name | Computed on read | Pure function of identity parts |
//! | Column | Optional | Object-level nodes have no column |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Extract the raw i64 value.
            #[must_use]
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// A strongly-typed catalog node ID.
    NodeId
);
id_type!(
    /// A strongly-typed lineage edge ID.
    EdgeId
);
id_type!(
    /// A strongly-typed analysis run ID.
    RunId
);

// ============================================================================
// Enums
// ============================================================================

/// Kinds of catalog nodes.
///
/// Tables, views, columns and routines exist in the live schema and can be
/// reconciled against it. The remaining kinds are transient constructs that
/// only exist inside the transformation logic that declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeKind {
    /// Base table
    Table,
    /// View
    View,
    /// Column of a table, view or transient construct
    Column,
    /// Stored procedure or function
    Routine,
    /// Trigger
    Trigger,
    /// Common table expression
    NamedSubquery,
    /// Session-scoped temporary table
    TemporaryTable,
    /// Table-valued variable
    TableVariable,
    /// Inline derived table (subquery in a FROM clause)
    DerivedTable,
}

impl NodeKind {
    /// Every node kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Table,
        Self::View,
        Self::Column,
        Self::Routine,
        Self::Trigger,
        Self::NamedSubquery,
        Self::TemporaryTable,
        Self::TableVariable,
        Self::DerivedTable,
    ];

    /// Kinds whose existence can be verified against the live schema.
    pub const SCHEMA_VERIFIABLE: [Self; 4] = [Self::Table, Self::View, Self::Column, Self::Routine];

    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Column => "column",
            Self::Routine => "routine",
            Self::Trigger => "trigger",
            Self::NamedSubquery => "named_subquery",
            Self::TemporaryTable => "temporary_table",
            Self::TableVariable => "table_variable",
            Self::DerivedTable => "derived_table",
        }
    }

    /// Whether the reconciler may deactivate nodes of this kind.
    #[must_use]
    pub fn is_schema_verifiable(&self) -> bool {
        Self::SCHEMA_VERIFIABLE.contains(self)
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidKind(s.to_string()))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for NodeKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// How a target value is derived from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransformKind {
    /// Value copied unchanged
    Direct,
    /// SUM, COUNT, AVG and friends
    Aggregation,
    /// CASE / IIF branches
    ConditionalExpression,
    /// Scalar function call
    ScalarFunction,
    /// Arithmetic expression
    Arithmetic,
    /// String concatenation
    Concatenation,
    /// ISNULL / COALESCE
    NullCoalesce,
    /// Participates in a join condition
    JoinPredicate,
    /// Participates in a WHERE / HAVING filter
    FilterPredicate,
    /// The analyzer could not classify the derivation
    Unknown,
}

impl TransformKind {
    /// Every transformation kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Direct,
        Self::Aggregation,
        Self::ConditionalExpression,
        Self::ScalarFunction,
        Self::Arithmetic,
        Self::Concatenation,
        Self::NullCoalesce,
        Self::JoinPredicate,
        Self::FilterPredicate,
        Self::Unknown,
    ];

    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Aggregation => "aggregation",
            Self::ConditionalExpression => "conditional_expression",
            Self::ScalarFunction => "scalar_function",
            Self::Arithmetic => "arithmetic",
            Self::Concatenation => "concatenation",
            Self::NullCoalesce => "null_coalesce",
            Self::JoinPredicate => "join_predicate",
            Self::FilterPredicate => "filter_predicate",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for TransformKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidKind(s.to_string()))
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TransformKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TransformKind> for String {
    fn from(kind: TransformKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Terminal status of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every assertion was written
    Success,
    /// Committed, but some assertions were rejected
    PartialSuccess,
    /// Rolled back; nothing from this run was written
    Failed,
}

impl RunStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Build the fully-qualified name `database.schema.object[.column]`.
#[must_use]
pub fn qualified_name(database: &str, schema: &str, object: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("{database}.{schema}.{object}.{column}"),
        None => format!("{database}.{schema}.{object}"),
    }
}

/// A node declaration: identity plus descriptive attributes.
///
/// This is the argument to [`crate::Tributary::upsert_node`] and the shape
/// analyzers use to declare nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node kind
    pub kind: NodeKind,
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

impl NodeSpec {
    /// Declare an object-level node.
    #[must_use]
    pub fn object(
        kind: NodeKind,
        database: impl Into<String>,
        schema: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            database: database.into(),
            schema: schema.into(),
            object: object.into(),
            column: None,
            data_type: None,
            nullable: None,
        }
    }

    /// Declare a column node.
    #[must_use]
    pub fn column(
        database: impl Into<String>,
        schema: impl Into<String>,
        object: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            column: Some(column.into()),
            ..Self::object(NodeKind::Column, database, schema, object)
        }
    }

    /// Set the declared data type.
    #[must_use]
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Set the declared nullability.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

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

    /// Check that every identity part is present.
    ///
    /// Column nodes must name a column; other kinds must not.
    pub fn validate(&self) -> Result<()> {
        for (part, value) in [
            ("database", &self.database),
            ("schema", &self.schema),
            ("object", &self.object),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidNode(format!(
                    "{} has an empty {part} name",
                    self.qualified_name()
                )));
            }
        }

        match (&self.kind, self.column.as_deref()) {
            (NodeKind::Column, None) => Err(Error::InvalidNode(format!(
                "column node {} has no column name",
                self.qualified_name()
            ))),
            (NodeKind::Column, Some(c)) if c.trim().is_empty() => Err(Error::InvalidNode(
                format!("column node {} has an empty column name", self.qualified_name()),
            )),
            (kind, Some(_)) if *kind != NodeKind::Column => Err(Error::InvalidNode(format!(
                "{kind} node {} must not name a column",
                self.qualified_name()
            ))),
            _ => Ok(()),
        }
    }
}

/// A catalog node as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Database ID
    pub id: NodeId,
    /// Node kind
    pub kind: NodeKind,
    /// Database (catalog) name
    pub database: String,
    /// Schema name
    pub schema: String,
    /// Object name
    pub object: String,
    /// Column name, for column nodes
    pub column: Option<String>,
    /// Declared data type
    pub data_type: Option<String>,
    /// Declared nullability
    pub nullable: Option<bool>,
    /// Inactive nodes have vanished from the live schema
    pub active: bool,
    /// When the node was first recorded
    pub created_at: DateTime<Utc>,
    /// When the node was last upserted, deactivated or reactivated
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Fully-qualified name, `database.schema.object[.column]`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified_name(
            &self.database,
            &self.schema,
            &self.object,
            self.column.as_deref(),
        )
    }
}

/// Lookup key for resolving a node by name.
///
/// The database is optional: when absent, any database matches, and the
/// lookup fails as ambiguous if more than one does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLocator {
    /// Database to search, or any
    pub database: Option<String>,
    /// Schema name
    pub schema: String,
    /// Object name
    pub object: String,
    /// Column name; `None` selects object-level nodes
    pub column: Option<String>,
}

impl NodeLocator {
    /// Locate an object-level node.
    #[must_use]
    pub fn new(schema: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: schema.into(),
            object: object.into(),
            column: None,
        }
    }

    /// Narrow the lookup to a column.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Narrow the lookup to a database.
    #[must_use]
    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl fmt::Display for NodeLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let database = self.database.as_deref().unwrap_or("*");
        f.write_str(&qualified_name(
            database,
            &self.schema,
            &self.object,
            self.column.as_deref(),
        ))
    }
}

// ============================================================================
// Edges
// ============================================================================

/// An edge assertion: the argument to [`crate::Tributary::upsert_edge`].
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    /// Node the value is derived from
    pub source: NodeId,
    /// Node whose value is derived
    pub target: NodeId,
    /// Transformation applied along the edge
    pub kind: TransformKind,
    /// Object (view, routine) whose logic asserted the edge
    pub producer: Option<NodeId>,
    /// Free-text description of the transformation
    pub description: Option<String>,
    /// Line in the producer's source where the derivation happens
    pub line: Option<u32>,
    /// Estimated probability the edge is correct
    pub confidence: f64,
}

impl EdgeSpec {
    /// Create a fully-confident edge with no producer or description.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, kind: TransformKind) -> Self {
        Self {
            source,
            target,
            kind,
            producer: None,
            description: None,
            line: None,
            confidence: 1.0,
        }
    }

    /// Attribute the edge to a producing object.
    #[must_use]
    pub fn produced_by(mut self, producer: NodeId) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Set the edge confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the transformation description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the source line.
    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Check the edge invariants: no self-loops, confidence within `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.source == self.target {
            return Err(Error::SelfReference(self.source));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

/// A lineage edge as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    /// Database ID
    pub id: EdgeId,
    /// Node the value is derived from
    pub source: NodeId,
    /// Node whose value is derived
    pub target: NodeId,
    /// Transformation applied along the edge
    pub kind: TransformKind,
    /// Producing object
    pub producer: Option<NodeId>,
    /// Free-text description
    pub description: Option<String>,
    /// Source line
    pub line: Option<u32>,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Inactive edges are no longer produced by their producer
    pub active: bool,
    /// Set while the producer is being re-analyzed and the edge not yet re-asserted
    pub provisional: bool,
    /// When the edge was first asserted
    pub created_at: DateTime<Utc>,
    /// When the edge was last asserted or deactivated
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Runs
// ============================================================================

/// A warning raised during an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    /// Short category, e.g. `dynamic_sql` or `rejected_edge`
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Line in the analyzed source
    #[serde(default)]
    pub line: Option<u32>,
    /// Column in the analyzed source
    #[serde(default)]
    pub column: Option<u32>,
}

impl RunWarning {
    /// Create a warning without a source location.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Attach a source line.
    #[must_use]
    pub fn at_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }
}

/// A finished analysis run, ready to be appended to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// What was analyzed, usually the producer's qualified name
    pub scope: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Edges written (zero for failed runs)
    pub edges_written: usize,
    /// Edges that could not be statically resolved with certainty
    pub low_certainty_edges: usize,
    /// Mean confidence of the written edges
    pub aggregate_confidence: Option<f64>,
    /// Terminal status
    pub status: RunStatus,
    /// Error text, for failed runs
    pub error: Option<String>,
    /// Warnings raised during the run
    pub warnings: Vec<RunWarning>,
}

/// A run as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    /// Database ID
    pub id: RunId,
    /// What was analyzed
    pub scope: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: i64,
    /// Edges written
    pub edges_written: usize,
    /// Number of warnings recorded for the run
    pub warning_count: usize,
    /// Edges that could not be statically resolved with certainty
    pub low_certainty_edges: usize,
    /// Mean confidence of the written edges
    pub aggregate_confidence: Option<f64>,
    /// Terminal status
    pub status: RunStatus,
    /// Error text, for failed runs
    pub error: Option<String>,
}

// ============================================================================
// Statistics
// ============================================================================

/// Counts describing the catalog contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Active node count per kind
    pub active_nodes_by_kind: std::collections::BTreeMap<NodeKind, usize>,
    /// Total active nodes
    pub active_nodes: usize,
    /// Total inactive nodes
    pub inactive_nodes: usize,
    /// Active edges
    pub active_edges: usize,
    /// Inactive (swept) edges
    pub inactive_edges: usize,
    /// Edges still flagged provisional (a run is in progress or was interrupted)
    pub provisional_edges: usize,
    /// Runs per terminal status
    pub runs_by_status: std::collections::BTreeMap<String, usize>,
}
