//! Cooking a formula into a [`TemplateSubgraph`].
//!
//! The formula name becomes the root container. Top-level steps are
//! contained in the root, nested steps in their enclosing step; `needs`
//! become `blocks` edges and `waits_for` become `waits-for` edges. Step
//! gates are materialized by [`GateMaterializer`] before any caller
//! supplied extension runs.

use std::collections::HashMap;

use beads_core::enums::{DependencyType, IssueType};
use beads_core::template::{
    self, TemplateBuilder, TemplateExtension, TemplateNode, TemplateSubgraph,
};

use crate::engine::cook;
use crate::types::{CookedStep, Formula, FormulaError, StepGate};

fn step_node(step: &CookedStep) -> TemplateNode {
    TemplateNode {
        id: step.id.clone(),
        title: step.title.clone(),
        description: step.description.clone(),
        issue_type: IssueType::from(step.issue_type.as_str()).normalize(),
        priority: step.priority,
        assignee: step.assignee.clone().unwrap_or_default(),
        labels: step.labels.clone(),
    }
}

/// Cook `formula` with `provided` variables and assemble the template.
pub fn cook_subgraph(
    formula: &Formula,
    provided: &HashMap<String, String>,
    extensions: &[&dyn TemplateExtension],
) -> Result<TemplateSubgraph, FormulaError> {
    let steps = cook(formula, provided)?;
    let root_id = formula.formula.as_str();

    let mut root = TemplateNode::new(root_id, root_id, IssueType::Epic);
    root.description = formula.description.clone();
    let mut builder = TemplateBuilder::new(root_id, root);

    for step in &steps {
        builder.add_node(step_node(step))?;
        let container = step.parent.as_deref().unwrap_or(root_id);
        builder.add_edge(&step.id, container, DependencyType::ParentChild)?;
        for need in &step.needs {
            builder.add_edge(&step.id, need, DependencyType::Blocks)?;
        }
        for awaited in &step.waits_for {
            builder.add_edge(&step.id, awaited, DependencyType::WaitsFor)?;
        }
    }

    builder.apply(&GateMaterializer::from_steps(&steps, root_id))?;
    for extension in extensions {
        builder.apply(*extension)?;
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone)]
struct PendingGate {
    step: String,
    container: String,
    priority: i32,
    gate: StepGate,
}

/// Turns each step's `gate` into a gate node the step waits for.
///
/// The gate node is `<step>.gate`, contained in the same container as the
/// step, and the step gets a `waits-for` edge to it.
#[derive(Debug, Clone, Default)]
pub struct GateMaterializer {
    gates: Vec<PendingGate>,
}

impl GateMaterializer {
    pub fn from_steps(steps: &[CookedStep], root: &str) -> Self {
        let gates = steps
            .iter()
            .filter_map(|step| {
                step.gate.as_ref().map(|gate| PendingGate {
                    step: step.id.clone(),
                    container: step.parent.clone().unwrap_or_else(|| root.to_owned()),
                    priority: step.priority,
                    gate: gate.clone(),
                })
            })
            .collect();
        Self { gates }
    }

    pub fn gate_id(step_id: &str) -> String {
        format!("{step_id}.gate")
    }
}

impl TemplateExtension for GateMaterializer {
    fn name(&self) -> &str {
        "gates"
    }

    fn extend(&self, builder: &mut TemplateBuilder) -> template::Result<()> {
        for pending in &self.gates {
            let id = Self::gate_id(&pending.step);
            let title = if pending.gate.id.is_empty() {
                format!("Gate {}", pending.gate.r#type)
            } else {
                format!("Gate {} {}", pending.gate.r#type, pending.gate.id)
            };
            let mut node = TemplateNode::new(id.clone(), title, IssueType::Gate);
            node.priority = pending.priority;
            node.labels = vec![format!("gate:{}", pending.gate.r#type)];
            if !pending.gate.timeout.is_empty() {
                node.description = format!("timeout: {}", pending.gate.timeout);
            }
            builder.add_node(node)?;
            builder.add_edge(&pending.step, &id, DependencyType::WaitsFor)?;
            builder.add_edge(&id, &pending.container, DependencyType::ParentChild)?;
        }
        Ok(())
    }
}
