//! Template subgraphs -- a cooked formula before it is spawned.
//!
//! A [`TemplateSubgraph`] is a node set, the dependency edges between those
//! nodes in template-local id space, and a designated root. It is assembled
//! with a [`TemplateBuilder`], optionally grown by [`TemplateExtension`]s, and
//! frozen by [`TemplateBuilder::build`]. Spawning it yields a [`SpawnResult`]
//! mapping every template id to the id of the item created for it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::dependency::EdgeKey;
use crate::enums::{DependencyType, IssueType, ItemKind};

/// Errors raised while building a template or validating a spawn mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("duplicate template node '{0}'")]
    DuplicateNode(String),

    #[error("edge references unknown template node '{0}'")]
    UnknownNode(String),

    #[error("template node '{0}' cannot depend on itself")]
    SelfEdge(String),

    #[error("extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

    #[error("template node '{0}' has no spawned item")]
    MissingMapping(String),

    #[error("spawned item '{spawned}' is mapped from more than one template node ('{first}', '{second}')")]
    NotInjective {
        spawned: String,
        first: String,
        second: String,
    },
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// Edge between two template nodes.
pub type TemplateEdge = EdgeKey;

/// One node of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub issue_type: IssueType,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

fn default_priority() -> i32 {
    2
}

impl TemplateNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, issue_type: IssueType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            issue_type,
            priority: default_priority(),
            assignee: String::new(),
            labels: Vec::new(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.issue_type.item_kind()
    }
}

/// A cooked template: immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSubgraph {
    name: String,
    root: String,
    nodes: BTreeMap<String, TemplateNode>,
    edges: Vec<TemplateEdge>,
}

impl TemplateSubgraph {
    /// Name of the formula this template was cooked from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&TemplateNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in id order, root included.
    pub fn nodes(&self) -> impl Iterator<Item = &TemplateNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[TemplateEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Something that adds nodes and edges to a template before it is frozen.
pub trait TemplateExtension {
    fn name(&self) -> &str;

    fn extend(&self, builder: &mut TemplateBuilder) -> Result<()>;
}

/// Mutable template under construction.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    name: String,
    root: String,
    nodes: BTreeMap<String, TemplateNode>,
    edges: Vec<TemplateEdge>,
    seen: HashSet<TemplateEdge>,
}

impl TemplateBuilder {
    pub fn new(name: impl Into<String>, root: TemplateNode) -> Self {
        let root_id = root.id.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            name: name.into(),
            root: root_id,
            nodes,
            edges: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&TemplateNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TemplateNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[TemplateEdge] {
        &self.edges
    }

    pub fn add_node(&mut self, node: TemplateNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(TemplateError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Adds `subject --kind--> object`. Returns `false` if the edge was
    /// already present. Endpoints are checked in [`build`](Self::build) so
    /// edges may be declared before their nodes.
    pub fn add_edge(
        &mut self,
        subject: impl Into<String>,
        object: impl Into<String>,
        kind: DependencyType,
    ) -> Result<bool> {
        let edge = EdgeKey::new(subject, object, kind);
        if edge.subject == edge.object {
            return Err(TemplateError::SelfEdge(edge.subject));
        }
        if !self.seen.insert(edge.clone()) {
            return Ok(false);
        }
        self.edges.push(edge);
        Ok(true)
    }

    /// Runs an extension against this builder.
    pub fn apply(&mut self, extension: &dyn TemplateExtension) -> Result<()> {
        extension
            .extend(self)
            .map_err(|e| TemplateError::Extension {
                name: extension.name().to_owned(),
                message: e.to_string(),
            })
    }

    /// Validates edge endpoints and freezes the template.
    pub fn build(self) -> Result<TemplateSubgraph> {
        for edge in &self.edges {
            for end in [&edge.subject, &edge.object] {
                if !self.nodes.contains_key(end) {
                    return Err(TemplateError::UnknownNode(end.clone()));
                }
            }
        }
        Ok(TemplateSubgraph {
            name: self.name,
            root: self.root,
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

/// Template id → spawned item id, for one spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnResult {
    root: String,
    mapping: BTreeMap<String, String>,
}

impl SpawnResult {
    /// Checks that every template node is mapped and no two nodes share an item.
    pub fn new(template: &TemplateSubgraph, mapping: BTreeMap<String, String>) -> Result<Self> {
        for node in template.nodes() {
            if !mapping.contains_key(&node.id) {
                return Err(TemplateError::MissingMapping(node.id.clone()));
            }
        }
        if let Some(extra) = mapping.keys().find(|k| !template.contains(k)) {
            return Err(TemplateError::UnknownNode(extra.clone()));
        }

        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (template_id, spawned) in &mapping {
            if let Some(first) = owners.insert(spawned, template_id) {
                return Err(TemplateError::NotInjective {
                    spawned: spawned.clone(),
                    first: first.to_owned(),
                    second: template_id.clone(),
                });
            }
        }

        let root = mapping
            .get(template.root())
            .cloned()
            .ok_or_else(|| TemplateError::MissingMapping(template.root().to_owned()))?;
        Ok(Self { root, mapping })
    }

    /// Identity mapping, for planning without spawning.
    pub fn preview(template: &TemplateSubgraph) -> Self {
        Self {
            root: template.root().to_owned(),
            mapping: template
                .nodes()
                .map(|n| (n.id.clone(), n.id.clone()))
                .collect(),
        }
    }

    /// Id of the item spawned for the template root.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn get(&self, template_id: &str) -> Option<&str> {
        self.mapping.get(template_id).map(String::as_str)
    }

    /// Like [`get`](Self::get) but an error when unmapped.
    pub fn resolve(&self, template_id: &str) -> Result<&str> {
        self.get(template_id)
            .ok_or_else(|| TemplateError::MissingMapping(template_id.to_owned()))
    }

    pub fn mapping(&self) -> &BTreeMap<String, String> {
        &self.mapping
    }

    /// All spawned item ids.
    pub fn spawned_ids(&self) -> BTreeSet<&str> {
        self.mapping.values().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sequential() -> TemplateSubgraph {
        let mut b = TemplateBuilder::new("seq", TemplateNode::new("seq", "Seq", IssueType::Epic));
        for id in ["t1", "t2"] {
            b.add_node(TemplateNode::new(id, id, IssueType::Task)).unwrap();
            b.add_edge(id, "seq", DependencyType::ParentChild).unwrap();
        }
        b.add_edge("t2", "t1", DependencyType::Blocks).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn builder_dedups_edges() {
        let mut b = TemplateBuilder::new("x", TemplateNode::new("x", "X", IssueType::Epic));
        b.add_node(TemplateNode::new("a", "A", IssueType::Task)).unwrap();
        assert_eq!(b.add_edge("a", "x", DependencyType::ParentChild), Ok(true));
        assert_eq!(b.add_edge("a", "x", DependencyType::ParentChild), Ok(false));
        assert_eq!(b.add_edge("a", "x", DependencyType::Related), Ok(true));
        assert_eq!(b.build().unwrap().edges().len(), 2);
    }

    #[test]
    fn builder_rejects_bad_input() {
        let mut b = TemplateBuilder::new("x", TemplateNode::new("x", "X", IssueType::Epic));
        assert_eq!(
            b.add_node(TemplateNode::new("x", "again", IssueType::Task)),
            Err(TemplateError::DuplicateNode("x".into()))
        );
        assert_eq!(
            b.add_edge("x", "x", DependencyType::Blocks),
            Err(TemplateError::SelfEdge("x".into()))
        );
        b.add_edge("ghost", "x", DependencyType::Blocks).unwrap();
        assert_eq!(b.build(), Err(TemplateError::UnknownNode("ghost".into())));
    }

    struct Reviewer;

    impl TemplateExtension for Reviewer {
        fn name(&self) -> &str {
            "reviewer"
        }

        fn extend(&self, builder: &mut TemplateBuilder) -> Result<()> {
            let root = builder.root().to_owned();
            builder.add_node(TemplateNode::new("review", "Review", IssueType::Task))?;
            builder.add_edge("review", root, DependencyType::ParentChild)?;
            Ok(())
        }
    }

    #[test]
    fn extension_adds_nodes() {
        let mut b = TemplateBuilder::new("x", TemplateNode::new("x", "X", IssueType::Epic));
        b.apply(&Reviewer).unwrap();
        assert!(b.contains("review"));

        let err = b.apply(&Reviewer).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Extension {
                name: "reviewer".into(),
                message: "duplicate template node 'review'".into(),
            }
        );
    }

    #[test]
    fn spawn_result_validates_mapping() {
        let t = sequential();
        let ok: BTreeMap<_, _> = [("seq", "bd-r"), ("t1", "bd-1"), ("t2", "bd-2")]
            .into_iter()
            .map(|(a, b)| (a.to_owned(), b.to_owned()))
            .collect();
        let spawned = SpawnResult::new(&t, ok.clone()).unwrap();
        assert_eq!(spawned.root(), "bd-r");
        assert_eq!(spawned.get("t2"), Some("bd-2"));
        assert!(spawned.resolve("t9").is_err());

        let mut missing = ok.clone();
        missing.remove("t1");
        assert_eq!(
            SpawnResult::new(&t, missing),
            Err(TemplateError::MissingMapping("t1".into()))
        );

        let mut shared = ok;
        shared.insert("t2".into(), "bd-1".into());
        assert!(matches!(
            SpawnResult::new(&t, shared),
            Err(TemplateError::NotInjective { .. })
        ));
    }

    #[test]
    fn preview_is_identity() {
        let t = sequential();
        let p = SpawnResult::preview(&t);
        assert_eq!(p.root(), "seq");
        assert_eq!(p.spawned_ids(), BTreeSet::from(["seq", "t1", "t2"]));
    }
}
