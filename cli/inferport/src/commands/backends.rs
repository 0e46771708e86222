//! `inferport backends`: registered backends and their capabilities.

use anyhow::Result;

use crate::context::Context;

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let capabilities = ctx.registry.capabilities();
    if json {
        println!("{}", serde_json::to_string_pretty(&capabilities)?);
        return Ok(());
    }

    for backend in &capabilities {
        println!("{:<16} {}", backend.name, backend.kind);
        if !backend.runtimes.is_empty() {
            println!("  runtimes:           {}", backend.runtimes.join(", "));
        }
        if !backend.firmware_platforms.is_empty() {
            println!("  firmware platforms: {}", backend.firmware_platforms.join(", "));
        }
        println!("  targets:");
        for target in &backend.targets {
            println!("    {target}");
        }
    }
    Ok(())
}
