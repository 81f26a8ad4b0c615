//! `ej config` -- show the resolved settings and where they came from.

use anyhow::Result;

use errata_config::config::to_yaml;
use errata_ui::styles::render_muted;

use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `ej config` command.
pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let settings = &ctx.settings;
    let source = settings.source.as_ref().map(|p| p.display().to_string());

    if ctx.json {
        output_json(&serde_json::json!({
            "source": source,
            "settings": settings,
        }));
        return Ok(());
    }

    if !ctx.quiet {
        let origin = source.unwrap_or_else(|| "no settings file (defaults and environment)".into());
        println!("{}", render_muted(&format!("# {}", origin)));
    }
    let yaml = to_yaml(settings)?;
    // serde_yaml renders an empty mapping as `{}`
    print!("{}", yaml);
    Ok(())
}
