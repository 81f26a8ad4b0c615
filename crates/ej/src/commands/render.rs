//! `ej render` -- render one template string against the runtime context.

use anyhow::Result;

use errata_template::{condition_with, render_with};

use crate::cli::RenderArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `ej render` command.
pub fn run(ctx: &RuntimeContext, args: &RenderArgs) -> Result<()> {
    let expand_ctx = ctx.expand_context(&args.context)?;

    if args.condition {
        let result = condition_with(&args.template, &expand_ctx)?;
        if ctx.json {
            output_json(&serde_json::json!({ "condition": args.template, "result": result }));
        } else {
            println!("{}", result);
        }
        return Ok(());
    }

    let rendered = render_with(&args.template, &expand_ctx)?;
    if ctx.json {
        output_json(&serde_json::json!({ "template": args.template, "rendered": rendered }));
    } else {
        println!("{}", rendered);
    }
    Ok(())
}
