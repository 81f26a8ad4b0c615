//! `ej catalog` -- check the service-catalog descriptor.

use anyhow::{Context, Result};

use errata_core::catalog::load_catalog;
use errata_ui::styles::{render_bold, render_muted, render_pass_icon};

use crate::cli::CatalogArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `ej catalog` command.
pub fn run(ctx: &RuntimeContext, args: &CatalogArgs) -> Result<()> {
    let path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        ctx.cwd.join(&args.path)
    };
    let info = load_catalog(&path).with_context(|| format!("failed to load {}", path.display()))?;
    info.validate()
        .with_context(|| format!("invalid catalog descriptor {}", path.display()))?;

    let dependencies: Vec<String> = info.dependencies().iter().map(ToString::to_string).collect();

    if ctx.json {
        output_json(&serde_json::json!({
            "valid": true,
            "kind": info.kind,
            "name": info.metadata.name,
            "owner": info.spec.owner,
            "lifecycle": info.spec.lifecycle,
            "depends_on": dependencies,
        }));
        return Ok(());
    }

    if ctx.quiet {
        return Ok(());
    }
    println!(
        "{} {} {} (owner {})",
        render_pass_icon(),
        info.kind,
        render_bold(&info.metadata.name),
        info.spec.owner
    );
    for dep in &dependencies {
        println!("  {}", render_muted(&format!("depends on {}", dep)));
    }
    Ok(())
}
