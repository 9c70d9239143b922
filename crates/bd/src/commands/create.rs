//! `bd create` -- create a new issue, optionally wired into the graph.

use anyhow::{Context, Result, bail};
use chrono::Utc;

use beads_core::dependency::{Dependency, EdgeKey};
use beads_core::enums::{DependencyType, IssueType};
use beads_core::idgen::IdGenerator;
use beads_core::issue::IssueBuilder;
use beads_graph::ItemState;
use beads_storage::{IssueFilter, Storage};

use crate::cli::CreateArgs;
use crate::context::RuntimeContext;
use crate::output::{BeadView, output_json};

/// Execute the `bd create` command.
pub fn run(ctx: &RuntimeContext, args: &CreateArgs) -> Result<()> {
    let title = args.title.trim();
    if title.is_empty() {
        bail!("title must not be empty");
    }
    let priority = parse_priority(&args.priority)?;
    let issue_type = IssueType::from(args.issue_type.as_str()).normalize();

    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;

    let mut wanted: Vec<(DependencyType, String)> = Vec::new();
    if let Some(parent) = &args.parent {
        wanted.push((DependencyType::ParentChild, parent.clone()));
    }
    for raw in &args.deps {
        wanted.push(parse_dep_arg(raw)?);
    }
    for (kind, target) in &wanted {
        engine.classifier().classify(kind)?;
        ws.store
            .get_issue(target)
            .with_context(|| format!("dependency target '{target}' not found"))?;
    }

    let now = Utc::now();
    let id = match &args.id {
        Some(id) => id.clone(),
        None => {
            let existing = ws.store.list_issues(&IssueFilter {
                include_templates: true,
                ..Default::default()
            })?;
            let mut ids = IdGenerator::new(ws.prefix()?, existing.len());
            ids.reserve(existing.into_iter().map(|issue| issue.id));
            let description = args.description.as_deref().unwrap_or_default();
            ids.next_id(title, description, &ws.actor, now)
                .context("could not generate a unique issue id")?
        }
    };

    let issue = IssueBuilder::new(title)
        .id(&id)
        .description(args.description.clone().unwrap_or_default())
        .priority(priority)
        .issue_type(issue_type)
        .assignee(args.assignee.clone().unwrap_or_default())
        .created_by(&ws.actor)
        .created_at(now)
        .labels(args.labels.clone())
        .build();

    ws.store.create_issue(&issue, &ws.actor)?;
    engine.upsert_item(&issue.id, ItemState::from(&issue))?;

    let edges: Vec<EdgeKey> = wanted
        .into_iter()
        .map(|(kind, target)| EdgeKey::new(&issue.id, target, kind))
        .collect();
    if !edges.is_empty() {
        let deps: Vec<Dependency> = edges
            .iter()
            .map(|e| e.clone().into_dependency(&ws.actor))
            .collect();
        engine.commit_edges(&edges, || Ok(ws.store.add_dependencies(&deps, &ws.actor)?))?;
    }

    if ctx.json {
        output_json(&BeadView::from_issue(&issue));
    } else if !ctx.quiet {
        println!("Created issue: {}", issue.id);
        println!("  Title: {}", issue.title);
        println!("  Priority: P{}", issue.priority);
        println!("  Status: {}", issue.status);
        for edge in &edges {
            println!("  Depends on: {} ({})", edge.object, edge.kind);
        }
    }

    Ok(())
}

/// Parses `[type:]id`; the type defaults to `blocks`.
fn parse_dep_arg(raw: &str) -> Result<(DependencyType, String)> {
    let raw = raw.trim();
    let (kind, target) = match raw.split_once(':') {
        Some((kind, target)) => (DependencyType::from(kind.trim()), target.trim()),
        None => (DependencyType::Blocks, raw),
    };
    if target.is_empty() {
        bail!("invalid dependency '{raw}': expected [type:]id");
    }
    Ok((kind, target.to_string()))
}

/// Parses `0`-`4` or `P0`-`P4`.
fn parse_priority(s: &str) -> Result<i32> {
    let s = s.trim();
    let digits = s
        .strip_prefix('P')
        .or_else(|| s.strip_prefix('p'))
        .unwrap_or(s);
    let p: i32 = digits
        .parse()
        .with_context(|| format!("invalid priority '{s}': expected 0-4 or P0-P4"))?;
    if !(0..=4).contains(&p) {
        bail!("priority must be between 0 and 4 (got {p})");
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_forms() {
        assert_eq!(parse_priority("0").unwrap(), 0);
        assert_eq!(parse_priority("P3").unwrap(), 3);
        assert_eq!(parse_priority(" p1 ").unwrap(), 1);
        assert!(parse_priority("5").is_err());
        assert!(parse_priority("-1").is_err());
        assert!(parse_priority("high").is_err());
    }

    #[test]
    fn dep_arg_defaults_to_blocks() {
        let (kind, target) = parse_dep_arg("bd-1").unwrap();
        assert_eq!(kind, DependencyType::Blocks);
        assert_eq!(target, "bd-1");

        let (kind, target) = parse_dep_arg("waits-for:bd-2").unwrap();
        assert_eq!(kind, DependencyType::WaitsFor);
        assert_eq!(target, "bd-2");

        assert!(parse_dep_arg("blocks:").is_err());
    }
}
