//! Formula engine for the beads system.
//!
//! Formulas are workflow templates stored as TOML or JSON. Cooking one
//! resolves its variables, evaluates step conditions and yields a
//! [`TemplateSubgraph`](beads_core::template::TemplateSubgraph) ready to be
//! spawned.

pub mod engine;
pub mod parser;
pub mod subgraph;
pub mod types;

pub use engine::cook;
pub use parser::{find_formula, load_formula, load_named};
pub use subgraph::{GateMaterializer, cook_subgraph};
pub use types::{Formula, FormulaError, Step};
