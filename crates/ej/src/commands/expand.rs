//! `ej expand` -- show the issues an issue config produces for an erratum.

use anyhow::{Context, Result};

use errata_template::{ResolvedIssue, WorkflowSpec, expand, load_spec};
use errata_ui::styles::render_bold;

use crate::cli::ExpandArgs;
use crate::context::RuntimeContext;
use crate::output::{output_json, print_issue_tree};

/// Execute the `ej expand` command.
pub fn run(ctx: &RuntimeContext, args: &ExpandArgs) -> Result<()> {
    let path = ctx.resolve_issue_config(args.config.as_deref())?;
    let spec = load_spec(&path).with_context(|| format!("failed to load {}", path.display()))?;
    let expand_ctx = ctx.expand_context(&args.context)?;

    let issues = expand(&spec, &expand_ctx)
        .with_context(|| format!("failed to expand {}", path.display()))?;

    if ctx.json {
        output_json(&serde_json::json!({
            "project": spec.project,
            "group": spec.group,
            "source": spec.source,
            "issues": issues,
        }));
        return Ok(());
    }

    if !ctx.quiet {
        println!("{}", header(&spec, &issues));
    }
    print_issue_tree(&issues);
    Ok(())
}

fn header(spec: &WorkflowSpec, issues: &[ResolvedIssue]) -> String {
    let noun = if issues.len() == 1 { "issue" } else { "issues" };
    format!(
        "{}: {} {} from {}",
        render_bold(&spec.project),
        issues.len(),
        noun,
        spec.source
    )
}
