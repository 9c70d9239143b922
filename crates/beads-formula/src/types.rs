//! Formula data model.
//!
//! Covers: steps (optionally nested), variables (with defaults & required),
//! conditions, dependencies between steps, and gate definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beads_core::template::TemplateError;

fn default_step_type() -> String {
    "task".to_string()
}

fn default_priority() -> i32 {
    2
}

/// Root structure for `.formula.json` / `.formula.toml` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    /// Unique identifier / name for this formula. Also the template id of
    /// the root container.
    pub formula: String,

    #[serde(default)]
    pub description: String,

    /// Schema version (currently 1).
    #[serde(default)]
    pub version: i32,

    #[serde(default)]
    pub vars: HashMap<String, VarDef>,

    /// Top-level steps; each may nest further steps under `children`.
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Where this formula was loaded from (set by the parser).
    #[serde(skip)]
    pub source: String,
}

/// Variable definition with optional default and required flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarDef {
    #[serde(default)]
    pub description: String,

    /// Whether the variable must be provided (no default).
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<String>,
}

/// A step that becomes an item when cooked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within this formula.
    pub id: String,

    /// Item title (supports `{{variable}}` substitution).
    pub title: String,

    /// Item description (supports substitution).
    #[serde(default)]
    pub description: String,

    /// Item type: "task", "bug", "feature", "epic", "chore", "gate".
    #[serde(default = "default_step_type")]
    pub r#type: String,

    /// Issue priority (0-4).
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Step IDs that must close before this step can start.
    #[serde(default)]
    pub needs: Vec<String>,

    /// Step IDs this step waits for (a softer, conditional wait).
    #[serde(default)]
    pub waits_for: Vec<String>,

    /// Condition for including this step, e.g. `"{{type}} == feature"`.
    /// An excluded step drops its children too.
    #[serde(default)]
    pub condition: Option<String>,

    /// Gate configuration (async wait condition).
    #[serde(default)]
    pub gate: Option<StepGate>,

    /// Default assignee (supports substitution).
    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    /// Nested steps, contained in this one.
    #[serde(default)]
    pub children: Vec<Step>,
}

impl Step {
    /// A plain task step, for building formulas in code.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            r#type: default_step_type(),
            priority: default_priority(),
            needs: Vec::new(),
            waits_for: Vec::new(),
            condition: None,
            gate: None,
            assignee: None,
            labels: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Gate defines an async wait condition for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepGate {
    /// Condition type: "human", "timer", "gh:run", "gh:pr".
    pub r#type: String,

    /// Condition identifier (e.g. workflow name for gh:run).
    #[serde(default)]
    pub id: String,

    /// How long to wait before escalation (e.g. "30m", "1h").
    #[serde(default)]
    pub timeout: String,
}

/// A fully-resolved step, flattened out of the step tree.
#[derive(Debug, Clone, Serialize)]
pub struct CookedStep {
    pub id: String,
    /// Enclosing step, `None` for top-level steps.
    pub parent: Option<String>,
    pub title: String,
    pub description: String,
    pub issue_type: String,
    pub priority: i32,
    pub needs: Vec<String>,
    pub waits_for: Vec<String>,
    pub gate: Option<StepGate>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
}

/// Errors that can occur during formula parsing and cooking.
#[derive(Debug, thiserror::Error)]
pub enum FormulaError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("formula '{name}' not found (searched {})", searched.join(", "))]
    NotFound { name: String, searched: Vec<String> },

    #[error("missing required variable: {0}")]
    MissingVariable(String),

    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("cycle detected in step dependencies: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
