//! `bd blocked` -- list blocked issues and what blocks them.

use anyhow::Result;

use crate::context::RuntimeContext;
use crate::output::{output_json, output_table};

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let ws = ctx.open()?;
    let blocked = ws.engine()?.blocked_items()?;

    if ctx.json {
        output_json(&blocked);
        return Ok(());
    }
    if blocked.is_empty() {
        if !ctx.quiet {
            println!("No blocked issues.");
        }
        return Ok(());
    }

    let rows: Vec<Vec<String>> = blocked
        .into_iter()
        .map(|item| {
            let via = item
                .blocked_containers
                .iter()
                .map(|c| format!("(in {c})"));
            let why: Vec<String> = item.blockers.into_iter().chain(via).collect();
            vec![item.id, why.join(", ")]
        })
        .collect();
    output_table(&["ID", "BLOCKED BY"], &rows);
    Ok(())
}
