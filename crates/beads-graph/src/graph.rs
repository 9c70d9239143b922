//! In-memory dependency graph.
//!
//! Every edge is classified once, on insert, and indexed in both
//! directions so the readiness engine can walk blockers, containers,
//! blocking dependents and children without rescanning the edge list.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use beads_core::classify::{Classifier, ClassifyError};
use beads_core::dependency::EdgeKey;
use beads_core::enums::{DependencyClass, DependencyType, ItemKind, Status};
use beads_core::issue::Issue;
use beads_storage::GraphRecords;

use crate::error::Result;

/// What the graph needs to know about an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemState {
    pub kind: ItemKind,
    pub status: Status,
    pub is_template: bool,
}

impl ItemState {
    pub fn new(kind: ItemKind, status: Status) -> Self {
        Self {
            kind,
            status,
            is_template: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }
}

impl From<&Issue> for ItemState {
    fn from(issue: &Issue) -> Self {
        Self {
            kind: issue.kind(),
            status: issue.status.clone(),
            is_template: issue.is_template,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Link {
    class: DependencyClass,
    peer: String,
    kind: DependencyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    classifier: Classifier,
    items: HashMap<String, ItemState>,
    /// subject -> objects
    outgoing: HashMap<String, BTreeSet<Link>>,
    /// object -> subjects
    incoming: HashMap<String, BTreeSet<Link>>,
}

impl DependencyGraph {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            ..Self::default()
        }
    }

    /// Builds the graph from a full store dump. Fails on any edge whose
    /// kind the classifier does not know.
    pub fn from_records(records: &GraphRecords, classifier: Classifier) -> Result<Self> {
        let mut graph = Self::new(classifier);
        for issue in &records.issues {
            graph.upsert_item(issue.id.clone(), ItemState::from(issue));
        }
        for dep in &records.dependencies {
            graph.insert_edge(&dep.key())?;
        }
        Ok(graph)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn upsert_item(&mut self, id: impl Into<String>, state: ItemState) {
        self.items.insert(id.into(), state);
    }

    pub fn item(&self, id: &str) -> Option<&ItemState> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &ItemState)> {
        self.items.iter().map(|(id, s)| (id.as_str(), s))
    }

    /// Returns `false` when `id` is unknown.
    pub fn set_status(&mut self, id: &str, status: Status) -> bool {
        match self.items.get_mut(id) {
            Some(state) => {
                state.status = status;
                true
            }
            None => false,
        }
    }

    /// Upsert-if-absent. Returns `false` when the edge already existed.
    pub fn insert_edge(&mut self, edge: &EdgeKey) -> std::result::Result<bool, ClassifyError> {
        let class = self.classifier.classify(&edge.kind)?;
        let inserted = self
            .outgoing
            .entry(edge.subject.clone())
            .or_default()
            .insert(Link {
                class,
                peer: edge.object.clone(),
                kind: edge.kind.clone(),
            });
        if inserted {
            self.incoming
                .entry(edge.object.clone())
                .or_default()
                .insert(Link {
                    class,
                    peer: edge.subject.clone(),
                    kind: edge.kind.clone(),
                });
        }
        Ok(inserted)
    }

    /// Returns `false` when the edge was not present.
    pub fn remove_edge(&mut self, edge: &EdgeKey) -> bool {
        let Ok(class) = self.classifier.classify(&edge.kind) else {
            return false;
        };
        let forward = Link {
            class,
            peer: edge.object.clone(),
            kind: edge.kind.clone(),
        };
        let removed = self
            .outgoing
            .get_mut(&edge.subject)
            .is_some_and(|links| links.remove(&forward));
        if removed {
            if let Some(links) = self.incoming.get_mut(&edge.object) {
                links.remove(&Link {
                    class,
                    peer: edge.subject.clone(),
                    kind: edge.kind.clone(),
                });
            }
        }
        removed
    }

    pub fn has_edge(&self, edge: &EdgeKey) -> bool {
        self.outgoing.get(&edge.subject).is_some_and(|links| {
            links
                .iter()
                .any(|l| l.peer == edge.object && l.kind == edge.kind)
        })
    }

    fn peers<'a>(
        index: &'a HashMap<String, BTreeSet<Link>>,
        id: &str,
        class: DependencyClass,
    ) -> impl Iterator<Item = &'a str> + 'a {
        index
            .get(id)
            .into_iter()
            .flatten()
            .filter(move |l| l.class == class)
            .map(|l| l.peer.as_str())
    }

    /// Objects of the blocking edges `id` is the subject of.
    pub fn blockers_of(&self, id: &str) -> impl Iterator<Item = &str> {
        Self::peers(&self.outgoing, id, DependencyClass::Blocking)
    }

    /// Containers `id` is a direct child of.
    pub fn containers_of(&self, id: &str) -> impl Iterator<Item = &str> {
        Self::peers(&self.outgoing, id, DependencyClass::Containment)
    }

    /// Subjects of the blocking edges pointing at `id`.
    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        Self::peers(&self.incoming, id, DependencyClass::Blocking)
    }

    /// Direct children of the container `id`.
    pub fn children_of(&self, id: &str) -> impl Iterator<Item = &str> {
        Self::peers(&self.incoming, id, DependencyClass::Containment)
    }

    /// A blocker counts as open unless it is a known, closed item.
    pub fn open_blockers(&self, id: &str) -> impl Iterator<Item = &str> {
        self.blockers_of(id)
            .filter(|b| self.items.get(*b).is_none_or(|s| !s.is_closed()))
    }

    /// All edges, in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.outgoing.iter().flat_map(|(subject, links)| {
            links
                .iter()
                .map(move |l| EdgeKey::new(subject.clone(), l.peer.clone(), l.kind.clone()))
        })
    }

    /// Shortest path `from ⇝ to` following outgoing edges of `class`.
    fn path(&self, from: &str, to: &str, class: DependencyClass) -> Option<Vec<String>> {
        let mut came_from: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = HashSet::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to.to_owned()];
                let mut at = to;
                while let Some(&prev) = came_from.get(at) {
                    path.push(prev.to_owned());
                    at = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in Self::peers(&self.outgoing, current, class) {
                if seen.insert(next) {
                    came_from.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// The cycle `edge` would close, as `[subject, object, ..., subject]`.
    /// Informational edges never close a cycle.
    pub fn would_create_cycle(
        &self,
        edge: &EdgeKey,
    ) -> std::result::Result<Option<Vec<String>>, ClassifyError> {
        let class = self.classifier.classify(&edge.kind)?;
        if class == DependencyClass::Informational {
            return Ok(None);
        }
        if edge.subject == edge.object {
            return Ok(Some(vec![edge.subject.clone(), edge.object.clone()]));
        }
        Ok(self.path(&edge.object, &edge.subject, class).map(|back| {
            let mut cycle = Vec::with_capacity(back.len() + 1);
            cycle.push(edge.subject.clone());
            cycle.extend(back);
            cycle
        }))
    }

    /// First cycle among edges of `class`, closed (`[a, b, ..., a]`).
    ///
    /// Iterative three-color DFS; roots are visited in sorted order so the
    /// reported cycle is stable.
    pub fn find_cycle(&self, class: DependencyClass) -> Option<Vec<String>> {
        let mut roots: Vec<&str> = self.outgoing.keys().map(String::as_str).collect();
        roots.sort_unstable();
        let mut colors: HashMap<&str, Color> = HashMap::new();

        for root in roots {
            if colors.contains_key(root) {
                continue;
            }
            let mut path: Vec<&str> = vec![root];
            let mut frames: Vec<Vec<&str>> = vec![Self::peers(&self.outgoing, root, class).collect()];
            colors.insert(root, Color::Gray);

            while let Some(frame) = frames.last_mut() {
                let Some(next) = frame.pop() else {
                    frames.pop();
                    if let Some(done) = path.pop() {
                        colors.insert(done, Color::Black);
                    }
                    continue;
                };
                match colors.get(next) {
                    Some(Color::Gray) => {
                        let start = path.iter().position(|n| *n == next).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|s| (*s).to_owned()).collect();
                        cycle.push(next.to_owned());
                        return Some(cycle);
                    }
                    Some(Color::Black) => {}
                    None => {
                        colors.insert(next, Color::Gray);
                        path.push(next);
                        frames.push(Self::peers(&self.outgoing, next, class).collect());
                    }
                }
            }
        }
        None
    }
}
