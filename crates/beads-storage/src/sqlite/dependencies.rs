//! Dependency operations and cycle detection for [`SqliteStore`].

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use rusqlite::{Connection, Row, params};
use tracing::debug;

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, EventType};

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{emit_event, format_datetime, list_issues_on_conn, parse_datetime};
use crate::sqlite::store::{SqliteStore, begin_immediate, commit};
use crate::traits::{GraphRecords, IssueFilter};

const DEPENDENCY_COLUMNS: &str = "issue_id, depends_on_id, type, created_at, created_by, metadata";

const BLOCKING_TYPES_SQL: &str = "'blocks', 'conditional-blocks', 'waits-for'";
const CONTAINMENT_TYPES_SQL: &str = "'parent-child'";

fn scan_dependency(row: &Row<'_>) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        issue_id: row.get("issue_id")?,
        depends_on_id: row.get("depends_on_id")?,
        dep_type: DependencyType::from(row.get::<_, String>("type")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        created_by: row.get("created_by")?,
        metadata: row.get("metadata")?,
    })
}

fn query_dependencies(
    conn: &Connection,
    where_sql: &str,
    args: &[&str],
) -> Result<Vec<Dependency>> {
    let sql = format!(
        "SELECT {DEPENDENCY_COLUMNS} FROM dependencies {where_sql}
         ORDER BY issue_id, depends_on_id, type"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), scan_dependency)?;
    let mut deps = Vec::new();
    for row in rows {
        deps.push(row?);
    }
    Ok(deps)
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

fn edge_exists(conn: &Connection, dep: &Dependency) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM dependencies
                       WHERE issue_id = ?1 AND depends_on_id = ?2 AND type = ?3)",
        params![dep.issue_id, dep.depends_on_id, dep.dep_type.as_str()],
        |row| row.get(0),
    )?)
}

/// Inserts a dependency unless the same `(subject, object, kind)` edge
/// already exists. Returns `true` if a row was written.
///
/// Blocking and containment edges are checked for cycles within their own
/// class before insertion.
pub(crate) fn insert_dependency(conn: &Connection, dep: &Dependency, actor: &str) -> Result<bool> {
    if dep.issue_id == dep.depends_on_id {
        return Err(StorageError::validation(format!(
            "{} cannot depend on itself",
            dep.issue_id
        )));
    }
    if edge_exists(conn, dep)? {
        return Ok(false);
    }

    if dep.dep_type.affects_ready_work() {
        detect_cycle(conn, &dep.issue_id, &dep.depends_on_id, BLOCKING_TYPES_SQL)?;
    } else if dep.dep_type.is_containment() {
        detect_cycle(conn, &dep.issue_id, &dep.depends_on_id, CONTAINMENT_TYPES_SQL)?;
    }

    let now_str = format_datetime(&Utc::now());
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO dependencies ({DEPENDENCY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![
            dep.issue_id,
            dep.depends_on_id,
            dep.dep_type.as_str(),
            format_datetime(&dep.created_at),
            if dep.created_by.is_empty() { actor } else { dep.created_by.as_str() },
            dep.metadata,
        ],
    )?;

    emit_event(
        conn,
        &dep.issue_id,
        EventType::DependencyAdded,
        actor,
        None,
        Some(&dep.depends_on_id),
        Some(dep.dep_type.as_str()),
        &now_str,
    )?;

    Ok(true)
}

pub(crate) fn remove_dependency_on_conn(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    dep_type: &DependencyType,
    actor: &str,
) -> Result<()> {
    let affected = conn.execute(
        "DELETE FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2 AND type = ?3",
        params![issue_id, depends_on_id, dep_type.as_str()],
    )?;

    if affected == 0 {
        return Err(StorageError::not_found(
            "dependency",
            format!("{issue_id} --{dep_type}--> {depends_on_id}"),
        ));
    }

    emit_event(
        conn,
        issue_id,
        EventType::DependencyRemoved,
        actor,
        Some(depends_on_id),
        None,
        Some(dep_type.as_str()),
        &format_datetime(&Utc::now()),
    )
}

pub(crate) fn get_dependency_records_on_conn(
    conn: &Connection,
    issue_id: &str,
) -> Result<Vec<Dependency>> {
    query_dependencies(conn, "WHERE issue_id = ?1", &[issue_id])
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Fails if adding `issue_id -> depends_on_id` would close a cycle among the
/// edge types listed in `types_sql`. BFS from `depends_on_id` looking for
/// `issue_id`; the error carries the cycle `issue_id -> depends_on_id -> ... -> issue_id`.
fn detect_cycle(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    types_sql: &str,
) -> Result<()> {
    let sql = format!(
        "SELECT depends_on_id FROM dependencies WHERE issue_id = ?1 AND type IN ({types_sql})"
    );
    let mut stmt = conn.prepare_cached(&sql)?;

    let mut came_from: HashMap<String, String> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    visited.insert(depends_on_id.to_string());
    queue.push_back(depends_on_id.to_string());

    while let Some(current) = queue.pop_front() {
        if current == issue_id {
            let mut path = vec![current.clone()];
            let mut cursor = current;
            while let Some(prev) = came_from.get(&cursor) {
                path.push(prev.clone());
                cursor = prev.clone();
            }
            path.push(issue_id.to_string());
            path.reverse();
            return Err(StorageError::CycleDetected { path });
        }
        let rows = stmt.query_map(params![current], |row| row.get::<_, String>(0))?;
        for row in rows {
            let next = row?;
            if visited.insert(next.clone()) {
                came_from.insert(next.clone(), current.clone());
                queue.push_back(next);
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub fn add_dependency_impl(&self, dep: &Dependency, actor: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        insert_dependency(&conn, dep, actor)
    }

    /// Inserts every edge in one IMMEDIATE transaction. Duplicates, both
    /// against stored edges and within `deps`, are skipped.
    pub fn add_dependencies_impl(&self, deps: &[Dependency], actor: &str) -> Result<Vec<Dependency>> {
        let conn = self.lock_conn()?;
        let tx = begin_immediate(&conn)?;
        let mut inserted = Vec::new();
        for dep in deps {
            if insert_dependency(&tx, dep, actor)? {
                inserted.push(dep.clone());
            }
        }
        commit(tx)?;
        debug!(
            requested = deps.len(),
            inserted = inserted.len(),
            "dependency batch committed"
        );
        Ok(inserted)
    }

    pub fn remove_dependency_impl(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: &DependencyType,
        actor: &str,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        remove_dependency_on_conn(&conn, issue_id, depends_on_id, dep_type, actor)
    }

    pub fn get_dependency_records_impl(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let conn = self.lock_conn()?;
        get_dependency_records_on_conn(&conn, issue_id)
    }

    pub fn get_dependent_records_impl(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let conn = self.lock_conn()?;
        query_dependencies(&conn, "WHERE depends_on_id = ?1", &[issue_id])
    }

    /// Reads every issue (templates included) and every edge under one lock.
    pub fn load_graph_impl(&self) -> Result<GraphRecords> {
        let conn = self.lock_conn()?;
        let issues = list_issues_on_conn(
            &conn,
            &IssueFilter {
                include_templates: true,
                ..Default::default()
            },
        )?;
        let dependencies = query_dependencies(&conn, "", &[])?;
        Ok(GraphRecords {
            issues,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use pretty_assertions::assert_eq;

    fn store_with(ids: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ids {
            store
                .create_issue_impl(&IssueBuilder::new(*id).id(*id).build(), "alice")
                .unwrap();
        }
        store
    }

    fn blocks(subject: &str, object: &str) -> Dependency {
        Dependency::new(subject, object, DependencyType::Blocks).created_by("test")
    }

    #[test]
    fn duplicate_edge_is_a_no_op() {
        let store = store_with(&["a", "b"]);
        assert!(store.add_dependency_impl(&blocks("a", "b"), "alice").unwrap());
        assert!(!store.add_dependency_impl(&blocks("a", "b"), "alice").unwrap());

        let related = Dependency::new("a", "b", DependencyType::Related);
        assert!(store.add_dependency_impl(&related, "alice").unwrap());
        assert_eq!(store.get_dependency_records_impl("a").unwrap().len(), 2);
    }

    #[test]
    fn remove_by_kind() {
        let store = store_with(&["a", "b"]);
        store.add_dependency_impl(&blocks("a", "b"), "alice").unwrap();
        let err = store
            .remove_dependency_impl("a", "b", &DependencyType::Related, "alice")
            .unwrap_err();
        assert!(err.is_not_found());
        store
            .remove_dependency_impl("a", "b", &DependencyType::Blocks, "alice")
            .unwrap();
        assert!(store.get_dependent_records_impl("b").unwrap().is_empty());
    }

    #[test]
    fn blocking_cycle_reports_path() {
        let store = store_with(&["a", "b", "c"]);
        store.add_dependency_impl(&blocks("a", "b"), "alice").unwrap();
        store.add_dependency_impl(&blocks("b", "c"), "alice").unwrap();

        let err = store.add_dependency_impl(&blocks("c", "a"), "alice").unwrap_err();
        match err {
            StorageError::CycleDetected { path } => {
                assert_eq!(path, vec!["c", "a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn containment_and_blocking_cycles_are_separate() {
        let store = store_with(&["epic", "task"]);
        let child = Dependency::new("task", "epic", DependencyType::ParentChild);
        store.add_dependency_impl(&child, "alice").unwrap();
        // The epic waiting on its own child is not a containment cycle.
        store.add_dependency_impl(&blocks("epic", "task"), "alice").unwrap();

        let back = Dependency::new("epic", "task", DependencyType::ParentChild);
        assert!(matches!(
            store.add_dependency_impl(&back, "alice"),
            Err(StorageError::CycleDetected { .. })
        ));
    }

    #[test]
    fn batch_rolls_back_on_cycle() {
        let store = store_with(&["a", "b", "c"]);
        store.add_dependency_impl(&blocks("b", "a"), "alice").unwrap();

        let batch = [blocks("c", "a"), blocks("a", "b")];
        assert!(store.add_dependencies_impl(&batch, "alice").is_err());
        assert!(store.get_dependency_records_impl("c").unwrap().is_empty());
    }

    #[test]
    fn batch_skips_duplicates_within_and_across_calls() {
        let store = store_with(&["h", "t1", "t2"]);
        store.add_dependency_impl(&blocks("h", "t1"), "alice").unwrap();

        let batch = [blocks("h", "t1"), blocks("h", "t2"), blocks("h", "t2")];
        let inserted = store.add_dependencies_impl(&batch, "alice").unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].depends_on_id, "t2");
        assert_eq!(store.get_dependency_records_impl("h").unwrap().len(), 2);
    }

    #[test]
    fn self_dependency_rejected() {
        let store = store_with(&["a"]);
        assert!(matches!(
            store.add_dependency_impl(&blocks("a", "a"), "alice"),
            Err(StorageError::Validation { .. })
        ));
    }

    #[test]
    fn load_graph_reads_everything() {
        let store = store_with(&["a", "b"]);
        store.add_dependency_impl(&blocks("a", "b"), "alice").unwrap();
        let graph = store.load_graph_impl().unwrap();
        assert_eq!(graph.issues.len(), 2);
        assert_eq!(graph.dependencies.len(), 1);
        assert_eq!(graph.dependencies[0].created_by, "test");
    }
}
