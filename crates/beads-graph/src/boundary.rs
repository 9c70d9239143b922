//! Entry and exit steps of a template subgraph.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use beads_core::classify::Classifier;
use beads_core::template::TemplateSubgraph;

use crate::error::{GraphError, Result};

/// Boundary nodes, in template-local ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoundarySteps {
    /// Nothing inside the subgraph blocks these.
    pub entry_steps: BTreeSet<String>,
    /// Nothing inside the subgraph depends on these.
    pub exit_steps: BTreeSet<String>,
}

impl BoundarySteps {
    /// `entry ∪ exit`, deduplicated.
    pub fn targets(&self) -> BTreeSet<&str> {
        self.entry_steps
            .iter()
            .chain(&self.exit_steps)
            .map(String::as_str)
            .collect()
    }
}

/// Computes the entry and exit steps over every node of `template`, the
/// root and containers excluded. Gates are ordinary steps.
pub fn find_boundary_steps(
    template: &TemplateSubgraph,
    classifier: &Classifier,
) -> Result<BoundarySteps> {
    let mut blocked: HashSet<&str> = HashSet::new();
    let mut depended_on: HashSet<&str> = HashSet::new();
    for edge in template.edges() {
        if !classifier.is_blocking(&edge.kind)? {
            continue;
        }
        if !(template.contains(&edge.subject) && template.contains(&edge.object)) {
            continue;
        }
        blocked.insert(&edge.subject);
        depended_on.insert(&edge.object);
    }

    let mut steps = BoundarySteps::default();
    for node in template.nodes() {
        if node.id == template.root() || node.kind().is_container() {
            continue;
        }
        if !blocked.contains(node.id.as_str()) {
            steps.entry_steps.insert(node.id.clone());
        }
        if !depended_on.contains(node.id.as_str()) {
            steps.exit_steps.insert(node.id.clone());
        }
    }

    if steps.entry_steps.is_empty() || steps.exit_steps.is_empty() {
        return Err(GraphError::NoActionableSteps {
            template: template.name().to_owned(),
        });
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::{DependencyType, IssueType};
    use beads_core::template::{TemplateBuilder, TemplateNode};
    use pretty_assertions::assert_eq;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn template(nodes: &[(&str, IssueType)], edges: &[(&str, &str, DependencyType)]) -> TemplateSubgraph {
        let mut b = TemplateBuilder::new("mol", TemplateNode::new("mol", "Mol", IssueType::Epic));
        for (id, ty) in nodes {
            b.add_node(TemplateNode::new(*id, *id, ty.clone())).unwrap();
            b.add_edge(*id, "mol", DependencyType::ParentChild).unwrap();
        }
        for (s, o, kind) in edges {
            b.add_edge(*s, *o, kind.clone()).unwrap();
        }
        b.build().unwrap()
    }

    fn find(t: &TemplateSubgraph) -> Result<BoundarySteps> {
        find_boundary_steps(t, &Classifier::new())
    }

    #[test]
    fn single_step_is_entry_and_exit() {
        let t = template(&[("t", IssueType::Task)], &[]);
        let steps = find(&t).unwrap();
        assert_eq!(steps.entry_steps, set(&["t"]));
        assert_eq!(steps.exit_steps, set(&["t"]));
        assert_eq!(steps.targets().len(), 1);
    }

    #[test]
    fn sequential_chain() {
        let t = template(
            &[("t1", IssueType::Task), ("t2", IssueType::Task), ("t3", IssueType::Task)],
            &[
                ("t2", "t1", DependencyType::Blocks),
                ("t3", "t2", DependencyType::Blocks),
            ],
        );
        let steps = find(&t).unwrap();
        assert_eq!(steps.entry_steps, set(&["t1"]));
        assert_eq!(steps.exit_steps, set(&["t3"]));
    }

    #[test]
    fn parallel_start() {
        let t = template(
            &[("t1", IssueType::Task), ("t2", IssueType::Task), ("t3", IssueType::Task)],
            &[
                ("t3", "t1", DependencyType::Blocks),
                ("t3", "t2", DependencyType::Blocks),
            ],
        );
        let steps = find(&t).unwrap();
        assert_eq!(steps.entry_steps, set(&["t1", "t2"]));
        assert_eq!(steps.exit_steps, set(&["t3"]));
    }

    #[test]
    fn gate_is_entry_and_gated_step_is_not() {
        let t = template(
            &[("gate", IssueType::Gate), ("step", IssueType::Task)],
            &[("step", "gate", DependencyType::WaitsFor)],
        );
        let steps = find(&t).unwrap();
        assert_eq!(steps.entry_steps, set(&["gate"]));
        assert_eq!(steps.exit_steps, set(&["step"]));
    }

    #[test]
    fn containers_only_has_no_actionable_steps() {
        let t = template(&[("a", IssueType::Epic), ("b", IssueType::Molecule)], &[]);
        assert!(matches!(find(&t), Err(GraphError::NoActionableSteps { .. })));

        let empty = template(&[], &[]);
        assert!(matches!(find(&empty), Err(GraphError::NoActionableSteps { .. })));
    }

    #[test]
    fn nested_template_yields_global_boundary() {
        // mol > phase (epic) > inner1 -> inner2, plus a top-level task
        // blocked by inner2.
        let mut b = TemplateBuilder::new("mol", TemplateNode::new("mol", "Mol", IssueType::Epic));
        b.add_node(TemplateNode::new("phase", "Phase", IssueType::Epic)).unwrap();
        b.add_node(TemplateNode::new("inner1", "I1", IssueType::Task)).unwrap();
        b.add_node(TemplateNode::new("inner2", "I2", IssueType::Task)).unwrap();
        b.add_node(TemplateNode::new("wrap", "Wrap", IssueType::Task)).unwrap();
        b.add_edge("phase", "mol", DependencyType::ParentChild).unwrap();
        b.add_edge("inner1", "phase", DependencyType::ParentChild).unwrap();
        b.add_edge("inner2", "phase", DependencyType::ParentChild).unwrap();
        b.add_edge("wrap", "mol", DependencyType::ParentChild).unwrap();
        b.add_edge("inner2", "inner1", DependencyType::Blocks).unwrap();
        b.add_edge("wrap", "inner2", DependencyType::Blocks).unwrap();
        let steps = find(&b.build().unwrap()).unwrap();
        assert_eq!(steps.entry_steps, set(&["inner1"]));
        assert_eq!(steps.exit_steps, set(&["wrap"]));
    }

    #[test]
    fn informational_edges_do_not_bound() {
        let t = template(
            &[("a", IssueType::Task), ("b", IssueType::Task)],
            &[("b", "a", DependencyType::Related)],
        );
        let steps = find(&t).unwrap();
        assert_eq!(steps.entry_steps, set(&["a", "b"]));
        assert_eq!(steps.exit_steps, set(&["a", "b"]));
    }

    #[test]
    fn undeclared_custom_kind_fails_classification() {
        let t = template(
            &[("a", IssueType::Task), ("b", IssueType::Task)],
            &[("b", "a", DependencyType::from("mentions"))],
        );
        assert!(matches!(find(&t), Err(GraphError::Classify(_))));
        let c = Classifier::new().with_informational(["mentions"]);
        assert!(find_boundary_steps(&t, &c).is_ok());
    }
}
