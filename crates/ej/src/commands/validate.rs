//! `ej validate` -- check an issue config without rendering it.
//!
//! Structural errors (unknown parents, cycles, bad hierarchy, template syntax)
//! fail the command. Lint findings are reported as warnings and only fail it
//! under `--strict`.

use anyhow::{Context, Result, bail};

use errata_template::load_spec;
use errata_template::validate::{lint, validate};
use errata_ui::styles::{render_pass_icon, render_warn, render_warn_icon};

use crate::cli::ValidateArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `ej validate` command.
pub fn run(ctx: &RuntimeContext, args: &ValidateArgs) -> Result<()> {
    let path = ctx.resolve_issue_config(args.config.as_deref())?;
    let spec = load_spec(&path).with_context(|| format!("failed to load {}", path.display()))?;
    validate(&spec).with_context(|| format!("invalid issue config {}", path.display()))?;
    let warnings = lint(&spec);

    if ctx.json {
        output_json(&serde_json::json!({
            "valid": true,
            "source": spec.source,
            "project": spec.project,
            "templates": spec.issues.len(),
            "warnings": warnings,
        }));
    } else {
        if !ctx.quiet {
            println!(
                "{} {}: project {}, {} templates",
                render_pass_icon(),
                spec.source,
                spec.project,
                spec.issues.len()
            );
        }
        for warning in &warnings {
            println!("{} {}", render_warn_icon(), render_warn(&warning.to_string()));
        }
    }

    if args.strict && !warnings.is_empty() {
        bail!("{} warning(s) in strict mode", warnings.len());
    }
    Ok(())
}
