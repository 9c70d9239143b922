//! `bd init` -- initialize a beads database in the current directory.

use std::env;
use std::fs;

use anyhow::{Context, Result, bail};

use beads_config::{database_path, ensure_beads_dir, load_config, save_config};
use beads_storage::{SqliteStore, Storage};

use crate::cli::InitArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

const GITIGNORE_CONTENT: &str = r#"# Beads database files
*.db
*.db-journal
*.db-wal
*.db-shm

# Cross-process locks
locks/
"#;

/// Execute the `bd init` command.
pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> Result<()> {
    let cwd = env::current_dir().context("failed to get current directory")?;
    let beads_dir = ensure_beads_dir(&cwd)
        .with_context(|| format!("failed to create {}", cwd.join(".beads").display()))?;

    let mut config = load_config(&beads_dir)?;
    let db_path = database_path(&beads_dir, &config);
    if !args.force && db_path.exists() {
        bail!(
            "Found existing database at {}\n\n\
            This workspace is already initialized. Use --force to re-initialize.",
            db_path.display()
        );
    }

    let prefix = match &args.prefix {
        Some(p) => p.trim_end_matches('-').to_string(),
        None => cwd
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches('-').to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "bd".to_string()),
    };

    let gitignore_path = beads_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, GITIGNORE_CONTENT).with_context(|| {
            format!("failed to create .gitignore: {}", gitignore_path.display())
        })?;
    }

    config.prefix = Some(prefix.clone());
    save_config(&beads_dir, &config)?;

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to create database: {}", db_path.display()))?;
    store.set_config("issue_prefix", &prefix)?;

    if ctx.json {
        output_json(&serde_json::json!({
            "beads_dir": beads_dir.display().to_string(),
            "database": db_path.display().to_string(),
            "prefix": prefix,
        }));
    } else if !ctx.quiet {
        println!("bd initialized successfully!");
        println!();
        println!("  Database: {}", db_path.display());
        println!("  Issue prefix: {}", prefix);
        println!("  Issues will be named: {prefix}-<hash> (e.g., {prefix}-a3f2dd)");
        println!();
        println!("Run `bd create \"My first issue\"` to get started.");
    }

    Ok(())
}
