//! Configuration for the beads system.
//!
//! Loading and saving `.beads/config.yaml`, and locating the `.beads/`
//! directory and its database.

pub mod beads_dir;
pub mod config;

pub use beads_dir::{database_path, ensure_beads_dir, find_beads_dir, find_beads_dir_or_error};
pub use config::{BeadsConfig, BondConfig, ConfigError, DependenciesConfig, load_config, save_config};
