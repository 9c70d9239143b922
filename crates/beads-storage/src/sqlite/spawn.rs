//! Spawning a template subgraph into concrete items.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use beads_core::dependency::Dependency;
use beads_core::idgen::IdGenerator;
use beads_core::issue::IssueBuilder;
use beads_core::template::{SpawnResult, TemplateSubgraph};

use crate::error::{Result, StorageError};
use crate::sqlite::dependencies::insert_dependency;
use crate::sqlite::issues::insert_issue;
use crate::sqlite::store::{SqliteStore, begin_immediate, commit};
use crate::traits::SpawnOptions;

fn existing_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM issues")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// Creates one item per node, then every template edge, on `conn`.
/// The caller owns the transaction.
fn spawn_on_conn(
    conn: &Connection,
    template: &TemplateSubgraph,
    options: &SpawnOptions,
) -> Result<SpawnResult> {
    let taken = existing_ids(conn)?;
    let mut ids = IdGenerator::new(&options.prefix, taken.len() + template.len());
    ids.reserve(taken);

    let now = Utc::now();
    let formula_label = format!("formula:{}", template.name());
    let mut mapping = BTreeMap::new();

    for node in template.nodes() {
        let id = ids
            .next_id(&node.title, &node.description, &options.actor, now)
            .ok_or_else(|| StorageError::IdExhausted {
                title: node.title.clone(),
            })?;

        let mut labels = node.labels.clone();
        if !labels.contains(&formula_label) {
            labels.push(formula_label.clone());
        }
        let issue = IssueBuilder::new(node.title.clone())
            .id(id.clone())
            .description(node.description.clone())
            .issue_type(node.issue_type.clone())
            .priority(node.priority)
            .assignee(node.assignee.clone())
            .created_by(options.actor.clone())
            .created_at(now)
            .labels(labels)
            .is_template(options.as_template)
            .source_formula(template.name())
            .build();
        insert_issue(conn, &issue, &options.actor)?;
        mapping.insert(node.id.clone(), id);
    }

    let spawned = SpawnResult::new(template, mapping)?;

    for edge in template.edges() {
        let dep = Dependency::new(
            spawned.resolve(&edge.subject)?,
            spawned.resolve(&edge.object)?,
            edge.kind.clone(),
        )
        .created_by(options.actor.clone());
        insert_dependency(conn, &dep, &options.actor)?;
    }

    Ok(spawned)
}

impl SqliteStore {
    /// Spawns `template` in one IMMEDIATE transaction; on any failure no item
    /// or edge from this spawn is left behind.
    pub fn spawn_subgraph_impl(
        &self,
        template: &TemplateSubgraph,
        options: &SpawnOptions,
    ) -> Result<SpawnResult> {
        let conn = self.lock_conn()?;
        let tx = begin_immediate(&conn)?;
        let spawned = spawn_on_conn(&tx, template, options)?;
        commit(tx)?;
        info!(
            formula = template.name(),
            root = spawned.root(),
            items = template.len(),
            edges = template.edges().len(),
            "spawned template subgraph"
        );
        Ok(spawned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::{DependencyType, IssueType};
    use beads_core::template::{TemplateBuilder, TemplateNode};
    use pretty_assertions::assert_eq;

    fn sequential() -> TemplateSubgraph {
        let mut b = TemplateBuilder::new(
            "release",
            TemplateNode::new("release", "Release", IssueType::Epic),
        );
        for id in ["build", "ship"] {
            b.add_node(TemplateNode::new(id, id, IssueType::Task)).unwrap();
            b.add_edge(id, "release", DependencyType::ParentChild).unwrap();
        }
        b.add_edge("ship", "build", DependencyType::Blocks).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn spawn_creates_items_and_edges() {
        let store = SqliteStore::open_in_memory().unwrap();
        let template = sequential();
        let spawned = store
            .spawn_subgraph_impl(&template, &SpawnOptions::new("t", "alice"))
            .unwrap();

        assert_eq!(spawned.mapping().len(), 3);
        let root = store.get_issue_impl(spawned.root()).unwrap();
        assert_eq!(root.issue_type, IssueType::Epic);
        assert_eq!(root.source_formula, "release");
        assert!(root.labels.contains(&"formula:release".to_string()));
        assert!(root.id.starts_with("t-"));

        let ship = spawned.get("ship").unwrap();
        let build = spawned.get("build").unwrap();
        let deps = store.get_dependency_records_impl(ship).unwrap();
        let mut kinds: Vec<_> = deps
            .iter()
            .map(|d| (d.depends_on_id.as_str(), d.dep_type.clone()))
            .collect();
        kinds.sort();
        let mut expected = vec![
            (build, DependencyType::Blocks),
            (spawned.root(), DependencyType::ParentChild),
        ];
        expected.sort();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn spawning_twice_yields_distinct_items() {
        let store = SqliteStore::open_in_memory().unwrap();
        let template = sequential();
        let opts = SpawnOptions::new("t", "alice");
        let a = store.spawn_subgraph_impl(&template, &opts).unwrap();
        let b = store.spawn_subgraph_impl(&template, &opts).unwrap();
        assert_ne!(a.root(), b.root());
        assert_eq!(store.count_issues_impl().unwrap(), 6);
    }
}
