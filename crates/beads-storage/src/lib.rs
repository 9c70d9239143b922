//! Storage backend for the beads system.
//!
//! Provides the [`Storage`] trait and a SQLite implementation ([`SqliteStore`]).

pub mod error;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience.
pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::{GraphRecords, IssueFilter, SpawnOptions, Storage, Transaction};

// ---------------------------------------------------------------------------
// Storage trait implementation for SqliteStore
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use beads_core::dependency::Dependency;
use beads_core::enums::DependencyType;
use beads_core::issue::Issue;
use beads_core::template::{SpawnResult, TemplateSubgraph};

use crate::error::Result;

impl Storage for SqliteStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.create_issue_impl(issue, actor)
    }

    fn create_issues(&self, issues: &[Issue], actor: &str) -> Result<()> {
        self.create_issues_impl(issues, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.get_issue_impl(id)
    }

    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.list_issues_impl(filter)
    }

    fn count_issues(&self) -> Result<usize> {
        self.count_issues_impl()
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        self.close_issue_impl(id, reason, actor)
    }

    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()> {
        self.reopen_issue_impl(id, actor)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<bool> {
        self.add_dependency_impl(dep, actor)
    }

    fn add_dependencies(&self, deps: &[Dependency], actor: &str) -> Result<Vec<Dependency>> {
        self.add_dependencies_impl(deps, actor)
    }

    fn remove_dependency(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: &DependencyType,
        actor: &str,
    ) -> Result<()> {
        self.remove_dependency_impl(issue_id, depends_on_id, dep_type, actor)
    }

    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.get_dependency_records_impl(issue_id)
    }

    fn get_dependent_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.get_dependent_records_impl(issue_id)
    }

    fn load_graph(&self) -> Result<GraphRecords> {
        self.load_graph_impl()
    }

    fn spawn_subgraph(
        &self,
        template: &TemplateSubgraph,
        options: &SpawnOptions,
    ) -> Result<SpawnResult> {
        self.spawn_subgraph_impl(template, options)
    }

    fn add_label(&self, issue_id: &str, label: &str) -> Result<()> {
        self.add_label_impl(issue_id, label)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        self.get_labels_impl(issue_id)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.set_config_impl(key, value)
    }

    fn get_config(&self, key: &str) -> Result<String> {
        self.get_config_impl(key)
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        self.get_all_config_impl()
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.run_in_transaction_impl(f)
    }
}
