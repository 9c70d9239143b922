//! `bd cook` -- cook a formula into a template subgraph and print it.
//!
//! Nothing is written. The output shows every node and edge, plus the
//! entry and exit steps a `require` bond would target.

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use beads_config::{find_beads_dir, load_config};
use beads_core::classify::Classifier;
use beads_core::template::TemplateSubgraph;
use beads_formula::{cook_subgraph, load_named};
use beads_graph::{BoundarySteps, GraphError, find_boundary_steps};

use crate::cli::CookArgs;
use crate::context::RuntimeContext;
use crate::output::{format_edge, join_ids, output_json};

#[derive(Serialize)]
struct CookView<'a> {
    template: &'a TemplateSubgraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    boundary: Option<BoundarySteps>,
}

/// Execute the `bd cook` command.
pub fn run(ctx: &RuntimeContext, args: &CookArgs) -> Result<()> {
    let vars = parse_var_flags(&args.vars)?;
    let template = load_template(&args.formula, &vars)?;
    let boundary = match find_boundary_steps(&template, &project_classifier()?) {
        Ok(steps) => Some(steps),
        Err(GraphError::NoActionableSteps { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    if ctx.json {
        output_json(&CookView {
            template: &template,
            boundary,
        });
        return Ok(());
    }

    println!("Formula: {} (root: {})", template.name(), template.root());
    println!("Nodes ({}):", template.len());
    for node in template.nodes() {
        println!(
            "  {} [P{}] [{}] {}",
            node.id, node.priority, node.issue_type, node.title
        );
    }
    println!("Edges ({}):", template.edges().len());
    for edge in template.edges() {
        println!("  {}", format_edge(edge));
    }
    match boundary {
        Some(steps) => {
            println!("Entry steps: {}", join_ids(&steps.entry_steps));
            println!("Exit steps: {}", join_ids(&steps.exit_steps));
        }
        None => println!("No actionable steps."),
    }
    Ok(())
}

/// Finds formula `name` from the current directory and cooks it.
pub(crate) fn load_template(name: &str, vars: &HashMap<String, String>) -> Result<TemplateSubgraph> {
    let cwd = env::current_dir().context("failed to get current directory")?;
    let formula = load_named(name, &cwd)?;
    cook_subgraph(&formula, vars, &[])
        .with_context(|| format!("failed to cook formula '{}'", formula.formula))
}

/// The classifier of the enclosing project, or the built-in one outside a
/// project.
fn project_classifier() -> Result<Classifier> {
    let cwd = env::current_dir().context("failed to get current directory")?;
    match find_beads_dir(&cwd) {
        Some(dir) => Ok(load_config(&dir)?.classifier()),
        None => Ok(Classifier::new()),
    }
}

/// Parses `--var key=value` flags.
pub(crate) fn parse_var_flags(vars: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for v in vars {
        let Some((key, value)) = v.split_once('=') else {
            bail!("invalid variable format '{v}': expected key=value");
        };
        if key.is_empty() {
            bail!("invalid variable format '{v}': empty key");
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_flags() {
        let vars = parse_var_flags(&["a=1".into(), "b=x=y".into(), "c=".into()]).unwrap();
        assert_eq!(vars["a"], "1");
        assert_eq!(vars["b"], "x=y");
        assert_eq!(vars["c"], "");
        assert!(parse_var_flags(&["novalue".into()]).is_err());
        assert!(parse_var_flags(&["=v".into()]).is_err());
    }
}
