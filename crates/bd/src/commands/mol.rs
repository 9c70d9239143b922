//! `bd mol` -- pour formulas into concrete issues and bond them onto
//! existing work.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use beads_core::dependency::EdgeKey;
use beads_core::enums::{BondPolicy, OperandKind};
use beads_core::template::{SpawnResult, TemplateSubgraph};
use beads_graph::{BondPlan, BondRequest, BondWarning, Bonder, ItemLocks, plan_bond};
use beads_storage::{SpawnOptions, Storage};

use crate::cli::{MolArgs, MolBondArgs, MolCommands, MolPourArgs};
use crate::commands::cook::{load_template, parse_var_flags};
use crate::context::{RuntimeContext, Workspace};
use crate::output::{format_edge, join_ids, output_json};

#[derive(Serialize)]
struct PourReport<'a> {
    formula: &'a str,
    root: &'a str,
    mapping: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct BondReport<'a> {
    head: &'a str,
    policy: BondPolicy,
    root: &'a str,
    mapping: &'a BTreeMap<String, String>,
    created: &'a [EdgeKey],
    skipped: &'a [EdgeKey],
    warnings: &'a [BondWarning],
}

/// Execute a `bd mol` subcommand.
pub fn run(ctx: &RuntimeContext, args: &MolArgs) -> Result<()> {
    match &args.command {
        MolCommands::Pour(a) => run_pour(ctx, a),
        MolCommands::Bond(a) => run_bond(ctx, a),
    }
}

fn spawn_options(ws: &Workspace, as_template: bool) -> Result<SpawnOptions> {
    let mut options = SpawnOptions::new(ws.prefix()?, &ws.actor);
    options.as_template = as_template;
    Ok(options)
}

fn print_mapping(spawned: &SpawnResult) {
    for (template_id, id) in spawned.mapping() {
        println!("  {template_id} -> {id}");
    }
}

fn run_pour(ctx: &RuntimeContext, args: &MolPourArgs) -> Result<()> {
    let vars = parse_var_flags(&args.vars)?;
    let template = load_template(&args.formula, &vars)?;

    if args.dry_run {
        return print_pour_preview(ctx, &template);
    }

    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;
    let locks = ItemLocks::new();
    let bonder = Bonder::new(&ws.store, &engine, &locks, &ws.actor);
    let spawned = bonder.spawn(&template, &spawn_options(&ws, args.template)?)?;

    if ctx.json {
        output_json(&PourReport {
            formula: template.name(),
            root: spawned.root(),
            mapping: spawned.mapping(),
        });
    } else if !ctx.quiet {
        println!(
            "Poured '{}': {} issues (root {})",
            template.name(),
            spawned.mapping().len(),
            spawned.root()
        );
        print_mapping(&spawned);
    }
    Ok(())
}

fn print_pour_preview(ctx: &RuntimeContext, template: &TemplateSubgraph) -> Result<()> {
    let preview = SpawnResult::preview(template);
    if ctx.json {
        output_json(&PourReport {
            formula: template.name(),
            root: preview.root(),
            mapping: preview.mapping(),
        });
        return Ok(());
    }
    println!(
        "Would pour '{}': {} issues, {} edges",
        template.name(),
        template.len(),
        template.edges().len()
    );
    for edge in template.edges() {
        println!("  {}", format_edge(edge));
    }
    Ok(())
}

fn run_bond(ctx: &RuntimeContext, args: &MolBondArgs) -> Result<()> {
    let vars = parse_var_flags(&args.vars)?;
    let template = load_template(&args.formula, &vars)?;

    let ws = ctx.open()?;
    let _lock = ws.lock()?;
    let engine = ws.engine()?;

    let head = ws.store.get_issue(&args.head)?;
    let policy = args.policy.unwrap_or(ws.config.bond.default_policy);
    let head_kind = args.head_kind.unwrap_or(if head.is_spawned() {
        OperandKind::Formula
    } else {
        OperandKind::Proto
    });
    // Planning against the template ids rejects invalid bonds before
    // anything is spawned.
    let preview = SpawnResult::preview(&template);
    let plan = plan_bond(
        &bond_request(args, &head.id, &template, &preview, policy, head_kind),
        engine.classifier(),
    )?;
    if args.dry_run {
        return print_plan(ctx, &plan);
    }

    let locks = ItemLocks::new();
    let bonder = Bonder::new(&ws.store, &engine, &locks, &ws.actor)
        .verify_postconditions(ws.config.bond.verify_postconditions);
    let spawned = bonder.spawn(&template, &spawn_options(&ws, false)?)?;
    let outcome = bonder
        .bond(&bond_request(
            args, &head.id, &template, &spawned, policy, head_kind,
        ))
        .with_context(|| unbonded(spawned.root()))?;

    for warning in &outcome.warnings {
        if !ctx.quiet {
            eprintln!("Warning: {warning}");
        }
    }
    if ctx.json {
        output_json(&BondReport {
            head: &head.id,
            policy,
            root: spawned.root(),
            mapping: spawned.mapping(),
            created: &outcome.created,
            skipped: &outcome.skipped,
            warnings: &outcome.warnings,
        });
    } else if !ctx.quiet {
        println!(
            "Bonded '{}' onto {} ({policy}): root {}",
            template.name(),
            head.id,
            spawned.root()
        );
        print_mapping(&spawned);
        for edge in &outcome.created {
            println!("  + {}", format_edge(edge));
        }
        for edge in &outcome.skipped {
            println!("  = {} (already present)", format_edge(edge));
        }
    }
    Ok(())
}

/// Spawning and bonding commit separately; a failed bond leaves the
/// spawned subgraph in place without any edge to the head.
fn unbonded(root: &str) -> String {
    format!("bond failed after spawning: {root} and its steps were created but not attached")
}

fn bond_request<'a>(
    args: &MolBondArgs,
    head: &'a str,
    template: &'a TemplateSubgraph,
    spawned: &'a SpawnResult,
    policy: BondPolicy,
    head_kind: OperandKind,
) -> BondRequest<'a> {
    BondRequest::new(head, template, spawned)
        .policy(policy)
        .explicit_type(args.attach_type)
        .head_kind(head_kind)
        .spawned_kind(OperandKind::Formula)
}

fn print_plan(ctx: &RuntimeContext, plan: &BondPlan) -> Result<()> {
    if ctx.json {
        output_json(plan);
        return Ok(());
    }
    for warning in &plan.warnings {
        eprintln!("Warning: {warning}");
    }
    println!("Bond plan ({}) for head {}:", plan.policy, plan.head);
    if plan.policy == BondPolicy::Require {
        println!("  Entry steps: {}", join_ids(&plan.entry_steps));
        println!("  Exit steps: {}", join_ids(&plan.exit_steps));
    }
    println!("  Edges ({}):", plan.edges.len());
    for edge in &plan.edges {
        println!("    {}", format_edge(edge));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_bond_names_the_spawned_root() {
        let err = anyhow::anyhow!("database is locked").context(unbonded("bd-mol1"));
        let message = format!("{err:#}");
        assert!(message.contains("bd-mol1"), "{message}");
        assert!(message.ends_with("database is locked"), "{message}");
    }
}
