//! Core types for the beads system.
//!
//! Items, typed dependency edges, the dependency classifier, template
//! subgraphs and the spawn-result contract shared by the storage and graph
//! crates.

pub mod classify;
pub mod dependency;
pub mod enums;
pub mod idgen;
pub mod issue;
pub mod template;
