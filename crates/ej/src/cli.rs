//! Clap CLI definitions for the `ej` command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// ej -- errata Jira issue templates.
///
/// Loads, validates and expands the issue configs that describe which Jira
/// issues to file when an erratum is tested.
#[derive(Parser, Debug)]
#[command(
    name = "ej",
    about = "Expand and check errata Jira issue templates",
    long_about = "Loads, validates and expands the issue configs that describe which Jira issues to file when an erratum is tested.",
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
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Settings file (default: $EJ_SETTINGS, .errata-jira.yaml, ~/.config/errata-jira/settings.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand an issue config into the issues it would create.
    Expand(ExpandArgs),

    /// Check an issue config for structural errors and warnings.
    #[command(alias = "lint")]
    Validate(ValidateArgs),

    /// Render a single template string.
    Render(RenderArgs),

    /// Plan what a respin does to previously created issues.
    Plan(PlanArgs),

    /// Check a service-catalog descriptor.
    Catalog(CatalogArgs),

    /// Show resolved settings.
    Config,

    /// Generate shell completions.
    Completion(CompletionArgs),

    /// Print version information.
    Version,
}

// ---------------------------------------------------------------------------
// Runtime context flags (shared)
// ---------------------------------------------------------------------------

/// Erratum, environment and assignee inputs for rendering.
#[derive(Args, Debug, Clone, Default)]
pub struct ContextArgs {
    /// Erratum record (YAML or JSON).
    #[arg(long, value_name = "FILE")]
    pub erratum: Option<PathBuf>,

    /// Erratum id (overrides the record's id).
    #[arg(long = "erratum-id", value_name = "ID")]
    pub erratum_id: Option<String>,

    /// Respin count (overrides the record's respin_count).
    #[arg(long, value_name = "N")]
    pub respin: Option<u32>,

    /// Release name (overrides the record's release).
    #[arg(long)]
    pub release: Option<String>,

    /// Erratum summary (overrides the record's summary).
    #[arg(long)]
    pub summary: Option<String>,

    /// Environment variable (KEY=VALUE), repeatable.
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Assign every issue to this user.
    #[arg(long, conflicts_with = "unassigned")]
    pub assignee: Option<String>,

    /// Leave every issue unassigned.
    #[arg(long)]
    pub unassigned: bool,
}

// ---------------------------------------------------------------------------
// Expand
// ---------------------------------------------------------------------------

/// Arguments for `ej expand`.
#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Issue config name or path (default: issue_config from settings).
    pub config: Option<String>,

    #[command(flatten)]
    pub context: ContextArgs,
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Arguments for `ej validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Issue config name or path (default: issue_config from settings).
    pub config: Option<String>,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Arguments for `ej render`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template text, e.g. 'ER#{{ ERRATUM.id }}'.
    pub template: String,

    /// Evaluate the text as a condition instead and print true/false.
    #[arg(long)]
    pub condition: bool,

    #[command(flatten)]
    pub context: ContextArgs,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Arguments for `ej plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Issue config name or path (default: issue_config from settings).
    pub config: Option<String>,

    /// Previously created issues (YAML or JSON list).
    #[arg(long, value_name = "FILE")]
    pub existing: PathBuf,

    /// Ignore closed issues and create new ones in their place.
    #[arg(long)]
    pub recreate: bool,

    #[command(flatten)]
    pub context: ContextArgs,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Arguments for `ej catalog`.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Descriptor path.
    #[arg(default_value = "catalog-info.yaml")]
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Arguments for `ej completion`.
#[derive(Args, Debug)]
pub struct CompletionArgs {
    #[command(subcommand)]
    pub command: CompletionCommands,
}

/// Completion subcommands.
#[derive(Subcommand, Debug)]
pub enum CompletionCommands {
    /// Generate Bash completions.
    Bash,
    /// Generate Zsh completions.
    Zsh,
    /// Generate Fish completions.
    Fish,
    /// Generate PowerShell completions.
    Powershell,
}
