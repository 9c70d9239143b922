//! Wiring a spawned subgraph to a head item.
//!
//! `default` adds one blocking edge from the spawned root to the head.
//! `require` makes the head blocked by every entry and exit step of the
//! subgraph and adds nothing between the spawned root and the head, so the
//! head's own blocked state never reaches the spawned steps.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use beads_core::classify::Classifier;
use beads_core::dependency::{Dependency, EdgeKey};
use beads_core::enums::{AttachType, BondPolicy, DependencyType, OperandKind};
use beads_core::template::{SpawnResult, TemplateSubgraph};
use beads_storage::{SpawnOptions, Storage};

use crate::boundary::find_boundary_steps;
use crate::error::{GraphError, Result};
use crate::graph::DependencyGraph;
use crate::locks::ItemLocks;
use crate::readiness::{ReadinessEngine, is_blocked_in};

/// One bond: a head, a spawned subgraph and how to wire them.
#[derive(Debug, Clone, Copy)]
pub struct BondRequest<'a> {
    pub head: &'a str,
    pub head_kind: OperandKind,
    pub template: &'a TemplateSubgraph,
    pub spawned: &'a SpawnResult,
    pub spawned_kind: OperandKind,
    pub policy: BondPolicy,
    /// `Some` when the caller picked an attach type explicitly.
    pub explicit_type: Option<AttachType>,
}

impl<'a> BondRequest<'a> {
    /// A `default` bond of a formula instantiation onto a pre-existing head.
    pub fn new(head: &'a str, template: &'a TemplateSubgraph, spawned: &'a SpawnResult) -> Self {
        Self {
            head,
            head_kind: OperandKind::Proto,
            template,
            spawned,
            spawned_kind: OperandKind::Formula,
            policy: BondPolicy::Default,
            explicit_type: None,
        }
    }

    pub fn policy(mut self, policy: BondPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn explicit_type(mut self, attach: Option<AttachType>) -> Self {
        self.explicit_type = attach;
        self
    }

    pub fn head_kind(mut self, kind: OperandKind) -> Self {
        self.head_kind = kind;
        self
    }

    pub fn spawned_kind(mut self, kind: OperandKind) -> Self {
        self.spawned_kind = kind;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum BondWarning {
    ExplicitTypeIgnored { attach_type: AttachType },
}

impl fmt::Display for BondWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitTypeIgnored { attach_type } => write!(
                f,
                "attach type '{attach_type}' is ignored under the require policy"
            ),
        }
    }
}

/// What a bond would do, computed without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondPlan {
    pub policy: BondPolicy,
    pub head: String,
    pub spawned_root: String,
    /// Template-local ids; empty under `default`.
    pub entry_steps: BTreeSet<String>,
    pub exit_steps: BTreeSet<String>,
    /// Spawned ids the head will be blocked by; empty under `default`.
    pub targets: BTreeSet<String>,
    pub edges: Vec<EdgeKey>,
    pub warnings: Vec<BondWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondOutcome {
    pub created: Vec<EdgeKey>,
    /// Planned edges that already existed.
    pub skipped: Vec<EdgeKey>,
    pub warnings: Vec<BondWarning>,
}

/// `require` needs exactly one side to be a formula instantiation.
pub fn validate_operands(
    policy: BondPolicy,
    head: OperandKind,
    spawned: OperandKind,
) -> Result<()> {
    if policy == BondPolicy::Require && head == spawned {
        return Err(GraphError::InvalidPolicyForOperands {
            policy,
            head,
            spawned,
        });
    }
    Ok(())
}

/// Computes the edges a bond would create. Pure.
pub fn plan_bond(request: &BondRequest<'_>, classifier: &Classifier) -> Result<BondPlan> {
    validate_operands(request.policy, request.head_kind, request.spawned_kind)?;
    let head = request.head.to_owned();
    let spawned_root = request.spawned.root().to_owned();

    match request.policy {
        BondPolicy::Default => {
            let attach = request.explicit_type.unwrap_or_default();
            Ok(BondPlan {
                policy: request.policy,
                edges: vec![EdgeKey::new(
                    spawned_root.clone(),
                    head.clone(),
                    attach.dependency_type(),
                )],
                head,
                spawned_root,
                entry_steps: BTreeSet::new(),
                exit_steps: BTreeSet::new(),
                targets: BTreeSet::new(),
                warnings: Vec::new(),
            })
        }
        BondPolicy::Require => {
            let boundary = find_boundary_steps(request.template, classifier)?;
            let mut targets = BTreeSet::new();
            for step in boundary.targets() {
                targets.insert(request.spawned.resolve(step)?.to_owned());
            }
            let edges = targets
                .iter()
                .map(|t| EdgeKey::new(head.clone(), t.clone(), DependencyType::Blocks))
                .collect();
            let warnings = request
                .explicit_type
                .map(|attach_type| BondWarning::ExplicitTypeIgnored { attach_type })
                .into_iter()
                .collect();
            Ok(BondPlan {
                policy: request.policy,
                head,
                spawned_root,
                entry_steps: boundary.entry_steps,
                exit_steps: boundary.exit_steps,
                targets,
                edges,
                warnings,
            })
        }
    }
}

pub struct Bonder<'a> {
    store: &'a dyn Storage,
    engine: &'a ReadinessEngine,
    locks: &'a ItemLocks,
    actor: String,
    verify: bool,
}

impl<'a> Bonder<'a> {
    pub fn new(
        store: &'a dyn Storage,
        engine: &'a ReadinessEngine,
        locks: &'a ItemLocks,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            locks,
            actor: actor.into(),
            verify: true,
        }
    }

    /// Whether to check post-conditions on a projected graph before
    /// committing. On by default.
    pub fn verify_postconditions(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn plan(&self, request: &BondRequest<'_>) -> Result<BondPlan> {
        plan_bond(request, self.engine.classifier())
    }

    /// Spawns `template` and registers the new items with the engine.
    pub fn spawn(&self, template: &TemplateSubgraph, options: &SpawnOptions) -> Result<SpawnResult> {
        self.engine.commit_spawn(template, options.as_template, || {
            Ok(self.store.spawn_subgraph(template, options)?)
        })
    }

    /// Plans, verifies and commits a bond. Either every planned edge is
    /// present afterwards or nothing was written.
    pub fn bond(&self, request: &BondRequest<'_>) -> Result<BondOutcome> {
        let plan = self.plan(request)?;
        let _guard = self
            .locks
            .acquire([plan.head.as_str(), plan.spawned_root.as_str()])?;

        for id in [&plan.head, &plan.spawned_root] {
            if !self.engine.contains(id)? {
                return Err(GraphError::not_found(id.as_str()));
            }
        }

        let mut projected = self.engine.snapshot()?;
        let entries: Vec<&str> = plan
            .entry_steps
            .iter()
            .map(|step| request.spawned.resolve(step))
            .collect::<std::result::Result<_, _>>()?;
        let mut ready_entries = Vec::new();
        for entry in &entries {
            if !is_blocked_in(&projected, entry)? {
                ready_entries.push(*entry);
            }
        }
        for edge in &plan.edges {
            if let Some(cycle) = projected.would_create_cycle(edge)? {
                return Err(GraphError::Integrity { cycle });
            }
            projected.insert_edge(edge)?;
        }
        if self.verify {
            verify(&projected, &plan, &ready_entries)?;
        }

        let deps: Vec<Dependency> = plan
            .edges
            .iter()
            .map(|e| e.clone().into_dependency(&self.actor))
            .collect();
        let inserted = self.engine.commit_edges(&plan.edges, || {
            Ok(self.store.add_dependencies(&deps, &self.actor)?)
        })?;
        let created: Vec<EdgeKey> = inserted.iter().map(EdgeKey::from).collect();
        let skipped: Vec<EdgeKey> = plan
            .edges
            .iter()
            .filter(|e| !created.contains(e))
            .cloned()
            .collect();

        for warning in &plan.warnings {
            warn!(head = %plan.head, "{warning}");
        }
        info!(
            head = %plan.head,
            root = %plan.spawned_root,
            policy = %plan.policy,
            created = created.len(),
            skipped = skipped.len(),
            "bonded subgraph"
        );
        Ok(BondOutcome {
            created,
            skipped,
            warnings: plan.warnings,
        })
    }
}

fn violated(item: &str, reason: &str) -> GraphError {
    GraphError::PostconditionViolated {
        item: item.to_owned(),
        reason: reason.to_owned(),
    }
}

fn is_open(graph: &DependencyGraph, id: &str) -> bool {
    graph.item(id).is_none_or(|s| !s.is_closed())
}

fn verify(projected: &DependencyGraph, plan: &BondPlan, ready_entries: &[&str]) -> Result<()> {
    match plan.policy {
        BondPolicy::Default => {
            if is_open(projected, &plan.head) && !is_blocked_in(projected, &plan.spawned_root)? {
                return Err(violated(&plan.spawned_root, "spawned root is not blocked by the head"));
            }
        }
        BondPolicy::Require => {
            for entry in ready_entries {
                if is_blocked_in(projected, entry)? {
                    return Err(violated(entry, "entry step would become blocked"));
                }
            }
            let any_open = plan.targets.iter().any(|t| is_open(projected, t));
            if any_open && !is_blocked_in(projected, &plan.head)? {
                return Err(violated(&plan.head, "head is not blocked by its targets"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::{IssueType, Status};
    use beads_core::issue::IssueBuilder;
    use beads_core::template::{TemplateBuilder, TemplateNode};
    use beads_storage::SqliteStore;
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: SqliteStore,
        locks: ItemLocks,
    }

    impl Fixture {
        fn new() -> Self {
            let store = SqliteStore::open_in_memory().unwrap();
            store
                .create_issue(&IssueBuilder::new("Head").id("h").build(), "tester")
                .unwrap();
            Self {
                store,
                locks: ItemLocks::new(),
            }
        }

        fn engine(&self) -> ReadinessEngine {
            ReadinessEngine::load(&self.store, Classifier::new()).unwrap()
        }

        fn edges_from(&self, id: &str) -> BTreeSet<EdgeKey> {
            self.store
                .get_dependency_records(id)
                .unwrap()
                .iter()
                .map(EdgeKey::from)
                .collect()
        }
    }

    /// Root epic `mol` containing the given steps, plus extra edges.
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

    fn single() -> TemplateSubgraph {
        template(&[("t", IssueType::Task)], &[])
    }

    fn sequential() -> TemplateSubgraph {
        template(
            &[("t1", IssueType::Task), ("t2", IssueType::Task), ("t3", IssueType::Task)],
            &[
                ("t2", "t1", DependencyType::Blocks),
                ("t3", "t2", DependencyType::Blocks),
            ],
        )
    }

    fn blocks(s: &str, o: &str) -> EdgeKey {
        EdgeKey::new(s, o, DependencyType::Blocks)
    }

    fn spawn_and_bond(
        fx: &Fixture,
        engine: &ReadinessEngine,
        t: &TemplateSubgraph,
        policy: BondPolicy,
    ) -> (SpawnResult, BondOutcome) {
        let bonder = Bonder::new(&fx.store, engine, &fx.locks, "tester");
        let spawned = bonder.spawn(t, &SpawnOptions::new("s", "tester")).unwrap();
        let outcome = bonder
            .bond(&BondRequest::new("h", t, &spawned).policy(policy))
            .unwrap();
        (spawned, outcome)
    }

    #[test]
    fn require_single_step_creates_one_edge() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let (spawned, outcome) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Require);
        let step = spawned.get("t").unwrap();
        assert_eq!(outcome.created, vec![blocks("h", step)]);
        assert_eq!(fx.edges_from("h"), BTreeSet::from([blocks("h", step)]));
    }

    #[test]
    fn require_sequential_targets_entry_and_exit() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = sequential();
        let (spawned, outcome) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Require);
        let expected = BTreeSet::from([
            blocks("h", spawned.get("t1").unwrap()),
            blocks("h", spawned.get("t3").unwrap()),
        ]);
        assert_eq!(outcome.created.into_iter().collect::<BTreeSet<_>>(), expected);
        assert_eq!(fx.edges_from("h"), expected);
        // no edge between the spawned root and the head, either way
        assert!(fx.edges_from(spawned.root()).iter().all(|e| e.object != "h"));
    }

    #[test]
    fn require_parallel_start() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = template(
            &[("t1", IssueType::Task), ("t2", IssueType::Task), ("t3", IssueType::Task)],
            &[
                ("t3", "t1", DependencyType::Blocks),
                ("t3", "t2", DependencyType::Blocks),
            ],
        );
        let (spawned, outcome) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Require);
        let objects: BTreeSet<&str> = outcome.created.iter().map(|e| e.object.as_str()).collect();
        let expected: BTreeSet<&str> = ["t1", "t2", "t3"]
            .iter()
            .map(|s| spawned.get(s).unwrap())
            .collect();
        assert_eq!(objects, expected);
    }

    #[test]
    fn require_targets_gate_not_gated_step_as_entry() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = template(
            &[("gate", IssueType::Gate), ("step", IssueType::Task)],
            &[("step", "gate", DependencyType::WaitsFor)],
        );
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned = SpawnResult::preview(&t);
        let plan = bonder
            .plan(&BondRequest::new("h", &t, &spawned).policy(BondPolicy::Require))
            .unwrap();
        assert_eq!(plan.entry_steps, BTreeSet::from(["gate".to_string()]));
        assert_eq!(plan.exit_steps, BTreeSet::from(["step".to_string()]));
    }

    #[test]
    fn containers_only_writes_nothing() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = template(&[("a", IssueType::Epic)], &[]);
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned = bonder.spawn(&t, &SpawnOptions::new("s", "tester")).unwrap();
        let err = bonder
            .bond(&BondRequest::new("h", &t, &spawned).policy(BondPolicy::Require))
            .unwrap_err();
        assert!(matches!(err, GraphError::NoActionableSteps { .. }));
        assert!(fx.edges_from("h").is_empty());
    }

    #[test]
    fn default_policy_blocks_root_on_head_only() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = sequential();
        let (spawned, outcome) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Default);
        assert_eq!(outcome.created, vec![blocks(spawned.root(), "h")]);
        assert!(fx.edges_from("h").is_empty());

        // everything under the root waits for the head
        assert!(engine.is_blocked(spawned.root()).unwrap());
        assert!(engine.is_blocked(spawned.get("t1").unwrap()).unwrap());
        engine
            .commit_status("h", Status::Closed, || {
                Ok(fx.store.close_issue("h", "done", "tester")?)
            })
            .unwrap();
        assert!(!engine.is_blocked(spawned.get("t1").unwrap()).unwrap());
    }

    #[test]
    fn default_policy_honors_conditional_attach() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned = bonder.spawn(&t, &SpawnOptions::new("s", "tester")).unwrap();
        let outcome = bonder
            .bond(&BondRequest::new("h", &t, &spawned).explicit_type(Some(AttachType::Conditional)))
            .unwrap();
        assert_eq!(outcome.created[0].kind, DependencyType::ConditionalBlocks);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn entry_steps_stay_ready_when_head_is_blocked() {
        let fx = Fixture::new();
        fx.store
            .create_issue(&IssueBuilder::new("Blocker").id("x").build(), "tester")
            .unwrap();
        fx.store
            .add_dependency(&Dependency::new("h", "x", DependencyType::Blocks), "tester")
            .unwrap();
        let engine = fx.engine();
        assert!(engine.is_blocked("h").unwrap());

        let t = sequential();
        let (spawned, _) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Require);
        assert!(!engine.is_blocked(spawned.get("t1").unwrap()).unwrap());
        assert!(engine.is_blocked(spawned.get("t3").unwrap()).unwrap());
        assert!(engine.is_blocked("h").unwrap());
        assert!(engine.ready_items().unwrap().contains(&spawned.get("t1").unwrap().to_string()));
    }

    #[test]
    fn rebonding_is_a_no_op() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = sequential();
        let (spawned, first) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Require);
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let second = bonder
            .bond(&BondRequest::new("h", &t, &spawned).policy(BondPolicy::Require))
            .unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.skipped.len(), first.created.len());
        assert_eq!(fx.edges_from("h").len(), 2);
    }

    #[test]
    fn default_rebond_skips_the_existing_edge() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let (spawned, first) = spawn_and_bond(&fx, &engine, &t, BondPolicy::Default);
        let edge = blocks(spawned.root(), "h");
        assert_eq!(first.created, vec![edge.clone()]);

        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let second = bonder
            .bond(&BondRequest::new("h", &t, &spawned).policy(BondPolicy::Default))
            .unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.skipped, vec![edge.clone()]);
        let stored = fx
            .store
            .get_dependent_records("h")
            .unwrap()
            .iter()
            .filter(|d| EdgeKey::from(*d) == edge)
            .count();
        assert_eq!(stored, 1);
    }

    #[test]
    fn concurrent_bonds_on_one_head_all_land() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned: Vec<SpawnResult> = (0..6)
            .map(|_| bonder.spawn(&t, &SpawnOptions::new("s", "tester")).unwrap())
            .collect();

        std::thread::scope(|scope| {
            for (i, spawned) in spawned.iter().enumerate() {
                let (fx, engine, t) = (&fx, &engine, &t);
                scope.spawn(move || {
                    let policy = if i % 2 == 0 {
                        BondPolicy::Require
                    } else {
                        BondPolicy::Default
                    };
                    Bonder::new(&fx.store, engine, &fx.locks, "tester")
                        .bond(&BondRequest::new("h", t, spawned).policy(policy))
                        .unwrap();
                });
            }
        });

        let stored = fx.edges_from("h").len() + fx.store.get_dependent_records("h").unwrap().len();
        assert_eq!(stored, 6);
        let live = engine
            .snapshot()
            .unwrap()
            .edges()
            .filter(|e| e.subject == "h" || e.object == "h")
            .count();
        assert_eq!(live, 6);
        assert!(engine.is_blocked("h").unwrap());
        assert!(fx.engine().is_blocked("h").unwrap());
    }

    #[test]
    fn require_rejects_same_kind_operands_before_writing() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned = bonder.spawn(&t, &SpawnOptions::new("s", "tester")).unwrap();
        for kind in [OperandKind::Proto, OperandKind::Formula] {
            let request = BondRequest::new("h", &t, &spawned)
                .policy(BondPolicy::Require)
                .head_kind(kind)
                .spawned_kind(kind);
            let err = bonder.bond(&request).unwrap_err();
            assert!(err.is_validation(), "{err}");
        }
        assert!(fx.edges_from("h").is_empty());

        // a formula head bonded to a proto is fine
        let request = BondRequest::new("h", &t, &spawned)
            .policy(BondPolicy::Require)
            .head_kind(OperandKind::Formula)
            .spawned_kind(OperandKind::Proto);
        assert_eq!(bonder.bond(&request).unwrap().created.len(), 1);
    }

    #[test]
    fn explicit_type_under_require_warns() {
        let t = single();
        let spawned = SpawnResult::preview(&t);
        let plan = plan_bond(
            &BondRequest::new("h", &t, &spawned)
                .policy(BondPolicy::Require)
                .explicit_type(Some(AttachType::Sequential)),
            &Classifier::new(),
        )
        .unwrap();
        assert_eq!(
            plan.warnings,
            vec![BondWarning::ExplicitTypeIgnored {
                attach_type: AttachType::Sequential
            }]
        );
        assert_eq!(plan.edges, vec![blocks("h", "t")]);
    }

    #[test]
    fn cycle_through_head_is_rejected() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned = bonder.spawn(&t, &SpawnOptions::new("s", "tester")).unwrap();
        let step = spawned.get("t").unwrap();
        engine
            .commit_edges(&[blocks(step, "h")], || {
                Ok(fx.store.add_dependency(&Dependency::new(step, "h", DependencyType::Blocks), "tester")?)
            })
            .unwrap();

        let err = bonder
            .bond(&BondRequest::new("h", &t, &spawned).policy(BondPolicy::Require))
            .unwrap_err();
        assert!(matches!(err, GraphError::Integrity { .. }));
        assert!(fx.edges_from("h").is_empty());
    }

    #[test]
    fn unknown_head_is_not_found() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let t = single();
        let bonder = Bonder::new(&fx.store, &engine, &fx.locks, "tester");
        let spawned = bonder.spawn(&t, &SpawnOptions::new("s", "tester")).unwrap();
        let err = bonder
            .bond(&BondRequest::new("missing", &t, &spawned))
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
    }
}
