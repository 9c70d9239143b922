//! `bd ready` -- show work with no active blockers.

use anyhow::Result;

use beads_core::enums::IssueType;
use beads_core::issue::Issue;
use beads_storage::Storage;

use crate::cli::ReadyArgs;
use crate::context::RuntimeContext;
use crate::output::{BeadView, format_issue_compact, output_json};

/// Execute the `bd ready` command.
pub fn run(ctx: &RuntimeContext, args: &ReadyArgs) -> Result<()> {
    let ws = ctx.open()?;
    let engine = ws.engine()?;
    let type_filter = args
        .issue_type
        .as_deref()
        .map(|t| IssueType::from(t).normalize());

    let mut issues: Vec<Issue> = Vec::new();
    for id in engine.ready_items()? {
        let issue = ws.store.get_issue(&id)?;
        if type_filter.as_ref().is_some_and(|t| *t != issue.issue_type) {
            continue;
        }
        if args.assignee.as_deref().is_some_and(|a| a != issue.assignee) {
            continue;
        }
        issues.push(issue);
    }
    issues.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    issues.truncate(args.limit);

    if ctx.json {
        let views: Vec<BeadView> = issues.iter().map(BeadView::from_issue).collect();
        output_json(&views);
        return Ok(());
    }
    if issues.is_empty() {
        if !ctx.quiet {
            println!("No ready work found.");
        }
        return Ok(());
    }
    if !ctx.quiet {
        println!("Ready work ({} issues with no blockers):", issues.len());
        println!();
    }
    for (i, issue) in issues.iter().enumerate() {
        println!("{}. {}", i + 1, format_issue_compact(issue));
    }
    Ok(())
}
