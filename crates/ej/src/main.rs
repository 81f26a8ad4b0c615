//! `ej` -- errata Jira issue template CLI.
//!
//! Parses CLI arguments with clap, resolves settings into the runtime context,
//! and dispatches to command handlers.

mod cli;
mod commands;
mod context;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Tracks whether a Ctrl+C has already been received.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

const DEFAULT_VERBOSE_FILTER: &str = "ej=debug,errata_template=debug,errata_config=debug";

fn main() {
    // First Ctrl+C: exit cleanly. Second: force exit.
    let _ = ctrlc::set_handler(|| {
        if CTRLC_RECEIVED.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        std::process::exit(0);
    });

    let cli = Cli::parse();

    if cli.global.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_VERBOSE_FILTER));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(&cli) {
        if cli.global.json {
            let err_json = serde_json::json!({
                "error": format!("{:#}", e),
            });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{}", s);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Commands that never read settings run before the settings file is loaded.
    let command = match cli.command {
        Some(Commands::Version) => return commands::version::run(cli.global.json),
        Some(Commands::Completion(ref args)) => return commands::completion::run(args),
        Some(ref command) => command,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            return Ok(());
        }
    };

    let ctx = RuntimeContext::from_global_args(&cli.global)?;

    match command {
        Commands::Expand(args) => commands::expand::run(&ctx, args),
        Commands::Validate(args) => commands::validate::run(&ctx, args),
        Commands::Render(args) => commands::render::run(&ctx, args),
        Commands::Plan(args) => commands::plan::run(&ctx, args),
        Commands::Catalog(args) => commands::catalog::run(&ctx, args),
        Commands::Config => commands::config_cmd::run(&ctx),
        Commands::Version | Commands::Completion(_) => Ok(()),
    }
}
