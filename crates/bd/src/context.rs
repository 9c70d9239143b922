//! Runtime context for command execution.
//!
//! [`RuntimeContext`] holds the global flags. Commands that need the
//! database call [`RuntimeContext::open`] to get a [`Workspace`]: the
//! discovered `.beads/` directory, its layered config and the store.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use beads_config::{BeadsConfig, database_path, find_beads_dir_or_error, load_config};
use beads_graph::ReadinessEngine;
use beads_lockfile::LockFile;
use beads_storage::{SqliteStore, Storage};

use crate::cli::GlobalArgs;

/// Name of the cross-process lock taken around graph mutations.
const GRAPH_LOCK: &str = "graph";

/// Runtime context passed to every command handler.
///
/// Constructed once in `main` after CLI parsing, before command dispatch.
#[derive(Debug)]
pub struct RuntimeContext {
    /// `--db` override.
    pub db_path: Option<PathBuf>,

    /// `--actor` (or `BD_ACTOR`), before falling back to config and git.
    pub actor_flag: Option<String>,

    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

/// An opened beads project.
pub struct Workspace {
    pub beads_dir: PathBuf,
    pub config: BeadsConfig,
    pub store: SqliteStore,
    pub actor: String,
}

impl RuntimeContext {
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self {
            db_path: global.db.as_ref().map(PathBuf::from),
            actor_flag: global.actor.clone(),
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        }
    }

    /// Whether human-readable progress should be printed.
    pub fn chatty(&self) -> bool {
        !self.json && !self.quiet
    }

    /// Locates the project and opens its database.
    pub fn open(&self) -> Result<Workspace> {
        let (beads_dir, config, db_path) = match &self.db_path {
            Some(db) => {
                let dir = db
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                (dir.clone(), load_project_config(&dir)?, db.clone())
            }
            None => {
                let cwd = env::current_dir().context("failed to get current directory")?;
                let dir = find_beads_dir_or_error(&cwd)?;
                let config = load_project_config(&dir)?;
                let db = database_path(&dir, &config);
                (dir, config, db)
            }
        };
        if !db_path.exists() {
            bail!(
                "no beads database found at {}\nHint: run 'bd init' to create a database",
                db_path.display()
            );
        }

        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open database: {}", db_path.display()))?;
        let actor = resolve_actor(self.actor_flag.as_deref(), config.actor.as_deref());
        Ok(Workspace {
            beads_dir,
            config,
            store,
            actor,
        })
    }
}

fn load_project_config(beads_dir: &Path) -> Result<BeadsConfig> {
    load_config(beads_dir)
        .with_context(|| format!("failed to load config from {}", beads_dir.display()))
}

impl Workspace {
    /// Builds the readiness engine over the current database contents.
    pub fn engine(&self) -> Result<ReadinessEngine> {
        ReadinessEngine::load(&self.store, self.config.classifier())
            .context("failed to load dependency graph")
    }

    /// Serializes graph mutations against other `bd` processes.
    pub fn lock(&self) -> Result<LockFile> {
        LockFile::acquire(&self.beads_dir, GRAPH_LOCK).context("failed to acquire graph lock")
    }

    /// Issue prefix: config file first, then the database.
    pub fn prefix(&self) -> Result<String> {
        match &self.config.prefix {
            Some(prefix) => Ok(prefix.clone()),
            None => self
                .store
                .get_config("issue_prefix")
                .context("failed to read issue prefix"),
        }
    }
}

/// Resolves the actor name.
///
/// Priority: explicit flag > config `actor` > BEADS_ACTOR env > git config
/// user.name > USER env > "unknown".
fn resolve_actor(flag_value: Option<&str>, configured: Option<&str>) -> String {
    for candidate in [flag_value, configured].into_iter().flatten() {
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }

    if let Ok(actor) = env::var("BEADS_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = Command::new("git").args(["config", "user.name"]).output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }

    "unknown".to_string()
}
