//! Storage and Transaction traits -- the public API for issue persistence.
//!
//! Consumers depend on these traits rather than on concrete implementations so
//! that alternative backends (mocks, proxies, etc.) can be substituted.

use std::collections::HashMap;

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, IssueType, Status};
use beads_core::issue::Issue;
use beads_core::template::{SpawnResult, TemplateSubgraph};

use crate::error::Result;

// ---------------------------------------------------------------------------
// View / helper types
// ---------------------------------------------------------------------------

/// Filter for [`Storage::list_issues`]. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub issue_type: Option<IssueType>,
    pub source_formula: Option<String>,
    pub include_templates: bool,
}

/// Every item and edge in the store, for building an in-memory graph.
#[derive(Debug, Clone, Default)]
pub struct GraphRecords {
    pub issues: Vec<Issue>,
    pub dependencies: Vec<Dependency>,
}

/// Parameters for [`Storage::spawn_subgraph`].
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// ID prefix for the spawned items.
    pub prefix: String,
    pub actor: String,
    /// Mark spawned items as templates (excluded from ready work).
    pub as_template: bool,
}

impl SpawnOptions {
    pub fn new(prefix: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            actor: actor.into(),
            as_template: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Primary storage interface for issue persistence.
pub trait Storage: Send + Sync {
    // -- Issue CRUD ----------------------------------------------------------

    /// Creates a new issue and emits a "created" event.
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;

    /// Creates multiple issues in a single transaction.
    fn create_issues(&self, issues: &[Issue], actor: &str) -> Result<()>;

    fn get_issue(&self, id: &str) -> Result<Issue>;

    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    fn count_issues(&self) -> Result<usize>;

    /// Sets status=closed, closed_at=now and emits a "closed" event.
    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()>;

    /// Sets status=open, clears closed_at and emits a "reopened" event.
    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()>;

    // -- Dependencies --------------------------------------------------------

    /// Adds one edge. Returns `false` if the `(subject, object, kind)` edge
    /// already existed; that is not an error.
    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<bool>;

    /// Adds a batch of edges in one transaction and returns only the edges
    /// that were newly inserted. Any failure rolls back the whole batch.
    fn add_dependencies(&self, deps: &[Dependency], actor: &str) -> Result<Vec<Dependency>>;

    fn remove_dependency(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: &DependencyType,
        actor: &str,
    ) -> Result<()>;

    /// Edges with `issue_id` as subject.
    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    /// Edges with `issue_id` as object.
    fn get_dependent_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    /// Loads every issue and edge.
    fn load_graph(&self) -> Result<GraphRecords>;

    // -- Spawning ------------------------------------------------------------

    /// Creates one item per template node and one edge per template edge in a
    /// single transaction, returning the template-id → item-id mapping.
    fn spawn_subgraph(
        &self,
        template: &TemplateSubgraph,
        options: &SpawnOptions,
    ) -> Result<SpawnResult>;

    // -- Labels --------------------------------------------------------------

    fn add_label(&self, issue_id: &str, label: &str) -> Result<()>;

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    // -- Configuration -------------------------------------------------------

    fn set_config(&self, key: &str, value: &str) -> Result<()>;

    fn get_config(&self, key: &str) -> Result<String>;

    fn get_all_config(&self) -> Result<HashMap<String, String>>;

    // -- Transactions --------------------------------------------------------

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If it returns `Err` or panics, the transaction is rolled back.
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Transaction trait
// ---------------------------------------------------------------------------

/// Subset of [`Storage`] methods available inside a transaction.
///
/// All operations share a single database connection and are committed or
/// rolled back atomically.
pub trait Transaction {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;
    fn get_issue(&self, id: &str) -> Result<Issue>;
    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()>;

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<bool>;
    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    fn add_label(&self, issue_id: &str, label: &str) -> Result<()>;

    fn set_config(&self, key: &str, value: &str) -> Result<()>;
    fn get_config(&self, key: &str) -> Result<String>;
}
