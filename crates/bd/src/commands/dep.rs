//! `bd dep` -- add, remove and list dependencies.

use anyhow::{Context, Result, bail};
use serde::Serialize;

use beads_core::dependency::{Dependency, EdgeKey};
use beads_core::enums::DependencyType;
use beads_storage::Storage;

use crate::cli::{DepAddArgs, DepArgs, DepCommands, DepListArgs, DepRemoveArgs};
use crate::context::{RuntimeContext, Workspace};
use crate::output::{format_edge, output_json, output_table};

#[derive(Serialize)]
struct EdgeChange<'a> {
    #[serde(flatten)]
    edge: &'a EdgeKey,
    changed: bool,
}

#[derive(Serialize)]
struct DepRow {
    id: String,
    #[serde(rename = "type")]
    dep_type: String,
    status: String,
    title: String,
}

/// Execute a `bd dep` subcommand.
pub fn run(ctx: &RuntimeContext, args: &DepArgs) -> Result<()> {
    match &args.command {
        DepCommands::Add(a) => run_add(ctx, a),
        DepCommands::Remove(a) => run_remove(ctx, a),
        DepCommands::List(a) => run_list(ctx, a),
    }
}

fn require_issue(ws: &Workspace, id: &str) -> Result<()> {
    ws.store
        .get_issue(id)
        .map(drop)
        .with_context(|| format!("issue '{id}' not found"))
}

fn run_add(ctx: &RuntimeContext, args: &DepAddArgs) -> Result<()> {
    if args.from == args.to {
        bail!("an issue cannot depend on itself");
    }
    let kind = DependencyType::from(args.dep_type.as_str());

    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;
    engine.classifier().classify(&kind)?;
    require_issue(&ws, &args.from)?;
    require_issue(&ws, &args.to)?;

    let edge = EdgeKey::new(&args.from, &args.to, kind);
    let dep: Dependency = edge.clone().into_dependency(&ws.actor);
    let created = engine.commit_edges(std::slice::from_ref(&edge), || {
        Ok(ws.store.add_dependency(&dep, &ws.actor)?)
    })?;

    if ctx.json {
        output_json(&EdgeChange {
            edge: &edge,
            changed: created,
        });
    } else if !ctx.quiet {
        if created {
            println!("Added dependency: {}", format_edge(&edge));
        } else {
            println!("Dependency already exists: {}", format_edge(&edge));
        }
    }
    Ok(())
}

fn run_remove(ctx: &RuntimeContext, args: &DepRemoveArgs) -> Result<()> {
    let kind = DependencyType::from(args.dep_type.as_str());
    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;

    let edge = EdgeKey::new(&args.from, &args.to, kind);
    engine.commit_edge_removal(&edge, || {
        Ok(ws
            .store
            .remove_dependency(&edge.subject, &edge.object, &edge.kind, &ws.actor)?)
    })?;

    if ctx.json {
        output_json(&EdgeChange {
            edge: &edge,
            changed: true,
        });
    } else if !ctx.quiet {
        println!("Removed dependency: {}", format_edge(&edge));
    }
    Ok(())
}

fn run_list(ctx: &RuntimeContext, args: &DepListArgs) -> Result<()> {
    let ws = ctx.open()?;
    require_issue(&ws, &args.id)?;

    let upward = args.direction == "up";
    let records = if upward {
        ws.store.get_dependent_records(&args.id)?
    } else {
        ws.store.get_dependency_records(&args.id)?
    };

    let mut rows = Vec::with_capacity(records.len());
    for dep in &records {
        let other = if upward {
            &dep.issue_id
        } else {
            &dep.depends_on_id
        };
        let (status, title) = match ws.store.get_issue(other) {
            Ok(issue) => (issue.status.to_string(), issue.title),
            Err(_) => ("missing".to_string(), String::new()),
        };
        rows.push(DepRow {
            id: other.clone(),
            dep_type: dep.dep_type.to_string(),
            status,
            title,
        });
    }

    if ctx.json {
        output_json(&rows);
        return Ok(());
    }
    if rows.is_empty() {
        if !ctx.quiet {
            let what = if upward { "dependents" } else { "dependencies" };
            println!("{} has no {what}", args.id);
        }
        return Ok(());
    }
    let table: Vec<Vec<String>> = rows
        .into_iter()
        .map(|r| vec![r.id, r.dep_type, r.status, r.title])
        .collect();
    output_table(&["ID", "TYPE", "STATUS", "TITLE"], &table);
    Ok(())
}
