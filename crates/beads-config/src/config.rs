//! Configuration types and loading for the beads system.
//!
//! [`BeadsConfig`] mirrors `.beads/config.yaml`. [`load_config`] layers the
//! built-in defaults, the YAML file and `BD_`-prefixed environment variables
//! (`BD_BOND__DEFAULT_POLICY=require`); [`save_config`] writes the file back.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use beads_core::classify::Classifier;
use beads_core::enums::BondPolicy;

/// Name of the config file inside `.beads/`.
pub const CONFIG_FILE: &str = "config.yaml";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// One of the layered sources held an invalid value.
    #[error("invalid configuration: {0}")]
    Extract(#[from] figment::Error),

    /// The `.beads/` directory was not found.
    #[error("no .beads directory found (run 'bd init' first)")]
    BeadsDirNotFound,
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// `bond:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondConfig {
    /// Policy used by `bd mol bond` when `--policy` is not given.
    #[serde(default, rename = "default-policy")]
    pub default_policy: BondPolicy,

    /// Check post-conditions on a projected graph before committing a bond.
    #[serde(default = "default_true", rename = "verify-postconditions")]
    pub verify_postconditions: bool,
}

impl Default for BondConfig {
    fn default() -> Self {
        Self {
            default_policy: BondPolicy::Default,
            verify_postconditions: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `dependencies:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Custom dependency kinds that never affect readiness.
    #[serde(default)]
    pub informational: Vec<String>,
}

/// The full beads configuration, corresponding to `.beads/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadsConfig {
    /// Issue ID prefix (e.g., `"bd"`).
    #[serde(default, rename = "issue-prefix", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Actor identity override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Database path override, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,

    #[serde(default)]
    pub bond: BondConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,
}

impl BeadsConfig {
    /// Classifier honoring the declared informational kinds.
    pub fn classifier(&self) -> Classifier {
        Classifier::new().with_informational(self.dependencies.informational.iter().cloned())
    }

    /// The layered sources, lowest priority first. Environment keys are
    /// kebab-cased so `BD_ISSUE_PREFIX` lands on `issue-prefix`.
    pub fn figment(beads_dir: &Path) -> Figment {
        Figment::from(Serialized::defaults(BeadsConfig::default()))
            .merge(Yaml::file(beads_dir.join(CONFIG_FILE)))
            .merge(
                Env::prefixed("BD_")
                    .split("__")
                    .map(|key| key.as_str().replace('_', "-").into()),
            )
    }
}

/// Loads configuration for the given `.beads/` directory.
///
/// A missing or empty file yields the defaults.
pub fn load_config(beads_dir: &Path) -> Result<BeadsConfig> {
    extract(BeadsConfig::figment(beads_dir))
}

/// Extracts a [`BeadsConfig`] from any figment.
pub fn extract(figment: Figment) -> Result<BeadsConfig> {
    Ok(figment.extract()?)
}

/// Saves configuration to `config.yaml` inside the given `.beads/` directory.
///
/// The directory is created if it does not exist.
pub fn save_config(beads_dir: &Path, config: &BeadsConfig) -> Result<()> {
    std::fs::create_dir_all(beads_dir)?;
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(beads_dir.join(CONFIG_FILE), yaml)?;
    Ok(())
}
