//! Clap CLI definitions for the `bd` command.

use clap::{Args, Parser, Subcommand};

use beads_core::enums::{AttachType, BondPolicy, OperandKind};

/// bd -- Dependency-aware issue tracker.
///
/// Issues chained together like beads, with formulas that can be poured
/// into concrete work and bonded onto existing items.
#[derive(Parser, Debug)]
#[command(
    name = "bd",
    about = "Dependency-aware issue tracker",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Database path (default: auto-discover .beads/beads.db).
    #[arg(long, global = true, env = "BD_DB")]
    pub db: Option<String>,

    /// Actor name for audit trail (default: $BD_ACTOR, config, git user.name, $USER).
    #[arg(long, global = true, env = "BD_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize bd in the current directory.
    Init(InitArgs),

    /// Create a new issue.
    #[command(alias = "new")]
    Create(CreateArgs),

    /// Close one or more issues.
    Close(CloseArgs),

    /// Reopen a closed issue.
    Reopen(ReopenArgs),

    /// Manage dependencies between issues.
    Dep(DepArgs),

    /// Show ready work (open, no active blockers).
    Ready(ReadyArgs),

    /// Show blocked issues and what blocks them.
    Blocked,

    /// Cook a formula into a template subgraph and print it.
    Cook(CookArgs),

    /// Molecule operations: pour formulas, bond them onto items.
    Mol(MolArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Issue prefix (default: current directory name).
    #[arg(short = 'p', long)]
    pub prefix: Option<String>,

    /// Re-initialize even if a database already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Issue title.
    pub title: String,

    /// Issue description.
    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// Issue type (bug|feature|task|epic|chore|molecule|gate).
    #[arg(short = 't', long = "type", default_value = "task")]
    pub issue_type: String,

    /// Priority (0-4 or P0-P4).
    #[arg(short = 'p', long, default_value = "2")]
    pub priority: String,

    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    /// Labels (repeatable).
    #[arg(short = 'l', long = "label")]
    pub labels: Vec<String>,

    /// Explicit issue ID instead of a generated one.
    #[arg(long)]
    pub id: Option<String>,

    /// Make the new issue a child of this container.
    #[arg(long)]
    pub parent: Option<String>,

    /// Dependencies as `[type:]id` (type defaults to blocks), repeatable.
    #[arg(long = "deps", value_delimiter = ',')]
    pub deps: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReopenArgs {
    /// Issue ID to reopen.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Issue IDs to close.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Reason for closing.
    #[arg(short = 'r', long)]
    pub reason: Option<String>,

    /// Close even if the issue is still blocked.
    #[arg(short = 'f', long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: DepCommands,
}

#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Add a dependency: FROM depends on TO.
    Add(DepAddArgs),
    /// Remove a dependency.
    Remove(DepRemoveArgs),
    /// List dependencies of an issue.
    List(DepListArgs),
}

#[derive(Args, Debug)]
pub struct DepAddArgs {
    /// Dependent issue ID.
    pub from: String,
    /// Issue it depends on.
    pub to: String,
    /// Dependency type (blocks, parent-child, waits-for, related, ...).
    #[arg(short = 't', long = "type", default_value = "blocks")]
    pub dep_type: String,
}

#[derive(Args, Debug)]
pub struct DepRemoveArgs {
    pub from: String,
    pub to: String,
    #[arg(short = 't', long = "type", default_value = "blocks")]
    pub dep_type: String,
}

#[derive(Args, Debug)]
pub struct DepListArgs {
    pub id: String,
    /// `down` lists what the issue depends on, `up` what depends on it.
    #[arg(long, default_value = "down", value_parser = ["down", "up"])]
    pub direction: String,
}

#[derive(Args, Debug)]
pub struct ReadyArgs {
    /// Maximum issues to show.
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct CookArgs {
    /// Formula name or path.
    pub formula: String,

    /// Variable substitution (key=value), repeatable.
    #[arg(long = "var")]
    pub vars: Vec<String>,
}

#[derive(Args, Debug)]
pub struct MolArgs {
    #[command(subcommand)]
    pub command: MolCommands,
}

#[derive(Subcommand, Debug)]
pub enum MolCommands {
    /// Instantiate a formula as concrete issues.
    Pour(MolPourArgs),
    /// Pour a formula and wire it to an existing head issue.
    Bond(MolBondArgs),
}

#[derive(Args, Debug)]
pub struct MolPourArgs {
    /// Formula name or path.
    pub formula: String,

    #[arg(long = "var")]
    pub vars: Vec<String>,

    /// Mark the poured issues as templates (never ready work).
    #[arg(long)]
    pub template: bool,

    /// Preview without creating anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct MolBondArgs {
    /// Existing issue to bond onto.
    pub head: String,

    /// Formula name or path.
    pub formula: String,

    /// Bond policy (default: from config, else `default`).
    #[arg(long)]
    pub policy: Option<BondPolicy>,

    /// Attach type of the single `default`-policy edge.
    #[arg(long = "type")]
    pub attach_type: Option<AttachType>,

    /// Whether the head is a pre-existing proto or a formula instantiation
    /// (default: detected from the head's source formula).
    #[arg(long)]
    pub head_kind: Option<OperandKind>,

    #[arg(long = "var")]
    pub vars: Vec<String>,

    /// Print the bond plan without creating anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bond_flags_parse_into_enums() {
        let cli = Cli::parse_from([
            "bd", "mol", "bond", "bd-1", "release", "--policy", "require", "--type",
            "conditional", "--var", "v=1",
        ]);
        let Some(Commands::Mol(MolArgs {
            command: MolCommands::Bond(args),
        })) = cli.command
        else {
            panic!("expected mol bond");
        };
        assert_eq!(args.policy, Some(BondPolicy::Require));
        assert_eq!(args.attach_type, Some(AttachType::Conditional));
        assert_eq!(args.head_kind, None);
        assert_eq!(args.vars, vec!["v=1"]);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = Cli::try_parse_from(["bd", "mol", "bond", "h", "f", "--policy", "always"]);
        assert!(err.is_err());
    }
}
