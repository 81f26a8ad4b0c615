//! `ej version` -- print version, build info, and platform.

use anyhow::Result;

use crate::output::output_json;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build identifier, overridable at compile time with `EJ_BUILD`.
const BUILD: &str = match option_env!("EJ_BUILD") {
    Some(b) => b,
    None => "dev",
};

/// Execute the `ej version` command.
pub fn run(json: bool) -> Result<()> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    if json {
        output_json(&serde_json::json!({
            "version": VERSION,
            "build": BUILD,
            "os": os,
            "arch": arch,
        }));
    } else {
        println!("ej version {} ({}) {}/{}", VERSION, BUILD, os, arch);
    }
    Ok(())
}
