//! Blocked/ready propagation.
//!
//! An item is blocked when it has a blocking edge to an object that is
//! not closed, or when any container it belongs to (transitively) is
//! blocked. Propagation runs downward only: a blocked child never marks
//! its container blocked.
//!
//! [`ReadinessEngine`] memoizes the blocked state per item. Every mutation
//! goes through one of its `commit_*` methods, which hold the graph write
//! lock across the storage commit and invalidate the affected items before
//! releasing it.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::debug;

use beads_core::classify::Classifier;
use beads_core::dependency::EdgeKey;
use beads_core::enums::{DependencyClass, Status};
use beads_core::template::{SpawnResult, TemplateSubgraph};
use beads_storage::Storage;

use crate::error::{GraphError, Result};
use crate::graph::{DependencyGraph, ItemState};

/// Blocked state of `start`, filling `memo` for every container visited.
///
/// Iterative DFS up the containment edges. Reaching an item that is
/// already on the stack is a containment cycle.
pub(crate) fn evaluate(
    graph: &DependencyGraph,
    memo: &mut HashMap<String, bool>,
    start: &str,
) -> Result<bool> {
    if let Some(&blocked) = memo.get(start) {
        return Ok(blocked);
    }

    let mut stack: Vec<String> = vec![start.to_owned()];
    let mut on_stack: HashSet<String> = HashSet::from([start.to_owned()]);

    while let Some(top) = stack.last().cloned() {
        let mut verdict = if graph.open_blockers(&top).next().is_some() {
            Some(true)
        } else {
            None
        };

        if verdict.is_none() {
            let mut pending = None;
            for container in graph.containers_of(&top) {
                match memo.get(container) {
                    Some(true) => {
                        verdict = Some(true);
                        break;
                    }
                    Some(false) => {}
                    None => {
                        pending = Some(container);
                        break;
                    }
                }
            }
            match (verdict, pending) {
                (None, Some(container)) => {
                    if on_stack.contains(container) {
                        let from = stack.iter().position(|s| s == container).unwrap_or(0);
                        let mut cycle = stack[from..].to_vec();
                        cycle.push(container.to_owned());
                        return Err(GraphError::Integrity { cycle });
                    }
                    on_stack.insert(container.to_owned());
                    stack.push(container.to_owned());
                    continue;
                }
                (None, None) => verdict = Some(false),
                _ => {}
            }
        }

        let blocked = verdict.unwrap_or(false);
        memo.insert(top.clone(), blocked);
        on_stack.remove(&top);
        stack.pop();
    }

    Ok(memo.get(start).copied().unwrap_or(false))
}

/// One-shot evaluation against `graph` with a throwaway memo.
pub fn is_blocked_in(graph: &DependencyGraph, id: &str) -> Result<bool> {
    evaluate(graph, &mut HashMap::new(), id)
}

/// Every item whose blocked state may depend on one of `seeds`: the seeds
/// themselves plus everything reachable through blocking dependents and
/// containment children, transitively.
fn affected(graph: &DependencyGraph, seeds: &[&str]) -> HashSet<String> {
    let mut out: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = seeds.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if !out.insert(id.to_owned()) {
            continue;
        }
        queue.extend(graph.dependents_of(id));
        queue.extend(graph.children_of(id));
    }
    out
}

fn first_cycle(graph: &DependencyGraph) -> Option<Vec<String>> {
    [DependencyClass::Blocking, DependencyClass::Containment]
        .into_iter()
        .find_map(|class| graph.find_cycle(class))
}

/// A blocked item and what blocks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedItem {
    pub id: String,
    /// Open objects of its own blocking edges.
    pub blockers: Vec<String>,
    /// Direct containers that are themselves blocked.
    pub blocked_containers: Vec<String>,
}

pub struct ReadinessEngine {
    classifier: Classifier,
    graph: RwLock<DependencyGraph>,
    cache: Mutex<HashMap<String, bool>>,
}

impl ReadinessEngine {
    /// Wraps `graph`, failing with [`GraphError::Integrity`] if it already
    /// holds a blocking or containment cycle.
    pub fn new(graph: DependencyGraph) -> Result<Self> {
        if let Some(cycle) = first_cycle(&graph) {
            return Err(GraphError::Integrity { cycle });
        }
        Ok(Self {
            classifier: graph.classifier().clone(),
            graph: RwLock::new(graph),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Loads every item and edge from `store`.
    pub fn load(store: &dyn Storage, classifier: Classifier) -> Result<Self> {
        let records = store.load_graph()?;
        let graph = DependencyGraph::from_records(&records, classifier)?;
        debug!(
            items = records.issues.len(),
            edges = records.dependencies.len(),
            "loaded dependency graph"
        );
        Self::new(graph)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DependencyGraph>> {
        self.graph
            .read()
            .map_err(|_| GraphError::LockPoisoned("graph"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DependencyGraph>> {
        self.graph
            .write()
            .map_err(|_| GraphError::LockPoisoned("graph"))
    }

    fn memo(&self) -> Result<MutexGuard<'_, HashMap<String, bool>>> {
        self.cache
            .lock()
            .map_err(|_| GraphError::LockPoisoned("readiness cache"))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read()?.contains(id))
    }

    pub fn item(&self, id: &str) -> Result<Option<ItemState>> {
        Ok(self.read()?.item(id).cloned())
    }

    /// Copy of the current graph, for projecting changes without applying them.
    pub fn snapshot(&self) -> Result<DependencyGraph> {
        Ok(self.read()?.clone())
    }

    pub fn is_blocked(&self, id: &str) -> Result<bool> {
        let graph = self.read()?;
        if !graph.contains(id) {
            return Err(GraphError::not_found(id));
        }
        let mut memo = self.memo()?;
        evaluate(&graph, &mut memo, id)
    }

    /// Number of memoized entries.
    pub fn cached(&self) -> Result<usize> {
        Ok(self.memo()?.len())
    }

    /// Drops the memoized state of `seeds` and of everything that depends
    /// on them.
    pub fn invalidate(&self, seeds: &[&str]) -> Result<usize> {
        let graph = self.read()?;
        self.invalidate_in(&graph, seeds)
    }

    fn invalidate_in(&self, graph: &DependencyGraph, seeds: &[&str]) -> Result<usize> {
        let stale = affected(graph, seeds);
        let mut memo = self.memo()?;
        let before = memo.len();
        memo.retain(|id, _| !stale.contains(id));
        let dropped = before - memo.len();
        debug!(seeds = seeds.len(), dropped, "invalidated readiness cache");
        Ok(dropped)
    }

    /// Applies `edges` to the graph around a storage `commit`.
    ///
    /// Cycle checks run against the live graph before `commit` is called;
    /// if either fails, the graph is left as it was.
    pub fn commit_edges<T>(
        &self,
        edges: &[EdgeKey],
        commit: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let mut graph = self.write()?;
        let mut inserted: Vec<&EdgeKey> = Vec::new();
        let staged = (|| -> Result<()> {
            for edge in edges {
                if let Some(cycle) = graph.would_create_cycle(edge)? {
                    return Err(GraphError::Integrity { cycle });
                }
                if graph.insert_edge(edge)? {
                    inserted.push(edge);
                }
            }
            Ok(())
        })();

        let result = staged.and_then(|()| commit());
        if result.is_err() {
            for edge in &inserted {
                graph.remove_edge(edge);
            }
            return result;
        }

        let subjects: Vec<&str> = edges.iter().map(|e| e.subject.as_str()).collect();
        self.invalidate_in(&graph, &subjects)?;
        result
    }

    /// Removes `edge` around a storage `commit`.
    pub fn commit_edge_removal<T>(
        &self,
        edge: &EdgeKey,
        commit: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let mut graph = self.write()?;
        let value = commit()?;
        graph.remove_edge(edge);
        self.invalidate_in(&graph, &[edge.subject.as_str()])?;
        Ok(value)
    }

    /// Changes the status of `id` around a storage `commit`.
    pub fn commit_status<T>(
        &self,
        id: &str,
        status: Status,
        commit: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let mut graph = self.write()?;
        if !graph.contains(id) {
            return Err(GraphError::not_found(id));
        }
        let value = commit()?;
        graph.set_status(id, status);
        self.invalidate_in(&graph, &[id])?;
        Ok(value)
    }

    /// Spawns `template` through `commit` and registers the new items and
    /// their intra-subgraph edges.
    pub fn commit_spawn(
        &self,
        template: &TemplateSubgraph,
        is_template: bool,
        commit: impl FnOnce() -> Result<SpawnResult>,
    ) -> Result<SpawnResult> {
        let mut graph = self.write()?;
        let spawned = commit()?;
        for node in template.nodes() {
            let id = spawned.resolve(&node.id)?;
            graph.upsert_item(
                id,
                ItemState {
                    kind: node.kind(),
                    status: Status::Open,
                    is_template,
                },
            );
        }
        for edge in template.edges() {
            let mapped = EdgeKey::new(
                spawned.resolve(&edge.subject)?,
                spawned.resolve(&edge.object)?,
                edge.kind.clone(),
            );
            graph.insert_edge(&mapped)?;
        }
        let ids: Vec<&str> = spawned.spawned_ids().into_iter().collect();
        self.invalidate_in(&graph, &ids)?;
        Ok(spawned)
    }

    /// Registers or replaces an item.
    pub fn upsert_item(&self, id: &str, state: ItemState) -> Result<()> {
        let mut graph = self.write()?;
        graph.upsert_item(id, state);
        self.invalidate_in(&graph, &[id])?;
        Ok(())
    }

    /// Open, non-container, non-template items that are not blocked, by id.
    pub fn ready_items(&self) -> Result<Vec<String>> {
        let graph = self.read()?;
        let mut memo = self.memo()?;
        let mut ready = Vec::new();
        for (id, state) in graph.items() {
            if state.is_closed() || state.is_template || state.kind.is_container() {
                continue;
            }
            if !evaluate(&graph, &mut memo, id)? {
                ready.push(id.to_owned());
            }
        }
        ready.sort();
        Ok(ready)
    }

    /// Open, non-template items that are blocked, by id.
    pub fn blocked_items(&self) -> Result<Vec<BlockedItem>> {
        let graph = self.read()?;
        let mut memo = self.memo()?;
        let mut blocked = BTreeMap::new();
        for (id, state) in graph.items() {
            if state.is_closed() || state.is_template || !evaluate(&graph, &mut memo, id)? {
                continue;
            }
            let mut blockers: Vec<String> =
                graph.open_blockers(id).map(str::to_owned).collect();
            blockers.sort();
            blockers.dedup();
            let mut blocked_containers = Vec::new();
            for container in graph.containers_of(id) {
                if evaluate(&graph, &mut memo, container)? {
                    blocked_containers.push(container.to_owned());
                }
            }
            blocked_containers.sort();
            blocked.insert(
                id.to_owned(),
                BlockedItem {
                    id: id.to_owned(),
                    blockers,
                    blocked_containers,
                },
            );
        }
        Ok(blocked.into_values().collect())
    }

    /// Fails with the first blocking or containment cycle found.
    pub fn check_integrity(&self) -> Result<()> {
        match first_cycle(&*self.read()?) {
            Some(cycle) => Err(GraphError::Integrity { cycle }),
            None => Ok(()),
        }
    }
}
