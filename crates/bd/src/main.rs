//! `bd` -- dependency-aware issue tracker CLI.
//!
//! Parses arguments with clap, builds the runtime context and dispatches to
//! the handlers in [`commands`].

mod cli;
mod commands;
mod context;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Set once the first Ctrl+C arrives.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

const VERBOSE_FILTER: &str = "bd=debug,beads_graph=debug,beads_storage=debug,beads_formula=debug";

fn main() {
    // First Ctrl+C exits cleanly, a second one forces exit.
    let _ = ctrlc::set_handler(|| {
        if CTRLC_RECEIVED.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        std::process::exit(0);
    });

    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(VERBOSE_FILTER))
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match &cli.command {
        Some(Commands::Init(args)) => commands::init::run(&ctx, args),
        Some(Commands::Create(args)) => commands::create::run(&ctx, args),
        Some(Commands::Close(args)) => commands::close::run(&ctx, args),
        Some(Commands::Reopen(args)) => commands::reopen::run(&ctx, args),
        Some(Commands::Dep(args)) => commands::dep::run(&ctx, args),
        Some(Commands::Ready(args)) => commands::ready::run(&ctx, args),
        Some(Commands::Blocked) => commands::blocked::run(&ctx),
        Some(Commands::Cook(args)) => commands::cook::run(&ctx, args),
        Some(Commands::Mol(args)) => commands::mol::run(&ctx, args),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if ctx.json {
            let err_json = serde_json::json!({ "error": format!("{e:#}") });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{s}");
            }
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}
