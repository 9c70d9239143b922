//! Dependency-graph consistency for beads: blocked/ready propagation,
//! boundary steps of template subgraphs, and bonding spawned subgraphs
//! onto existing items.

pub mod bond;
pub mod boundary;
pub mod error;
pub mod graph;
pub mod locks;
pub mod readiness;

pub use bond::{BondOutcome, BondPlan, BondRequest, BondWarning, Bonder, plan_bond, validate_operands};
pub use boundary::{BoundarySteps, find_boundary_steps};
pub use error::{GraphError, Result};
pub use graph::{DependencyGraph, ItemState};
pub use locks::{ItemGuard, ItemLocks};
pub use readiness::{BlockedItem, ReadinessEngine, is_blocked_in};
