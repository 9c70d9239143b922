//! `bd close` -- close issues and report what they unblocked.

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::debug;

use beads_core::enums::Status;
use beads_storage::Storage;

use crate::cli::CloseArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

#[derive(Serialize)]
struct CloseReport {
    closed: Vec<String>,
    /// Items that became ready because of this close.
    unblocked: Vec<String>,
}

/// Execute the `bd close` command.
pub fn run(ctx: &RuntimeContext, args: &CloseArgs) -> Result<()> {
    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;
    let reason = args.reason.as_deref().unwrap_or("Closed");

    let before: BTreeSet<String> = engine.ready_items()?.into_iter().collect();
    let mut closed = Vec::new();
    for id in &args.ids {
        let issue = ws.store.get_issue(id)?;
        if issue.is_closed() {
            if ctx.chatty() {
                println!("{id} is already closed");
            }
            continue;
        }
        if !args.force && engine.is_blocked(id)? {
            bail!("cannot close {id}: it is still blocked (use --force to override)");
        }
        engine.commit_status(id, Status::Closed, || {
            Ok(ws.store.close_issue(id, reason, &ws.actor)?)
        })?;
        debug!(id = %id, reason, "closed issue");
        closed.push(id.clone());
    }

    let unblocked: Vec<String> = engine
        .ready_items()?
        .into_iter()
        .filter(|id| !before.contains(id) && !closed.contains(id))
        .collect();

    if ctx.json {
        output_json(&CloseReport { closed, unblocked });
    } else if !ctx.quiet {
        for id in &closed {
            println!("Closed {id}: {reason}");
        }
        if !unblocked.is_empty() {
            println!();
            println!("Now ready: {}", unblocked.join(", "));
        }
    }

    Ok(())
}
