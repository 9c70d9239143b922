//! `bd reopen` -- reopen a closed issue.
//!
//! Whatever it blocks becomes blocked again, so the status change goes
//! through the readiness engine like `close` does.

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use serde::Serialize;

use beads_core::enums::Status;
use beads_storage::Storage;

use crate::cli::ReopenArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

#[derive(Serialize)]
struct ReopenReport<'a> {
    reopened: &'a str,
    /// Items that were ready and are blocked again.
    reblocked: Vec<String>,
}

/// Execute the `bd reopen` command.
pub fn run(ctx: &RuntimeContext, args: &ReopenArgs) -> Result<()> {
    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;

    let issue = ws.store.get_issue(&args.id)?;
    if !issue.is_closed() {
        bail!("{} is not closed", issue.id);
    }

    let before: BTreeSet<String> = engine.ready_items()?.into_iter().collect();
    engine.commit_status(&issue.id, Status::Open, || {
        Ok(ws.store.reopen_issue(&issue.id, &ws.actor)?)
    })?;
    let after: BTreeSet<String> = engine.ready_items()?.into_iter().collect();
    let reblocked: Vec<String> = before.difference(&after).cloned().collect();

    if ctx.json {
        output_json(&ReopenReport {
            reopened: &issue.id,
            reblocked,
        });
    } else if !ctx.quiet {
        println!("Reopened {}", issue.id);
        if !reblocked.is_empty() {
            println!("Blocked again: {}", reblocked.join(", "));
        }
    }
    Ok(())
}
