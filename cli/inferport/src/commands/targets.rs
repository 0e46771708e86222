//! `inferport targets`: chips, packages and the targets they offer.

use anyhow::{bail, Result};
use serde_json::json;

use crate::context::Context;

pub fn run(ctx: &Context, soc: Option<&str>, packages: bool, json: bool) -> Result<()> {
    let socs = match soc {
        Some(soc) => {
            let Some(chip) = ctx.catalog.chip(soc) else {
                bail!(
                    "unknown chip '{soc}'. Supported chips: {}",
                    ctx.catalog.supported_socs().join(", ")
                );
            };
            vec![chip.name.clone()]
        }
        None => ctx.catalog.supported_socs(),
    };

    if packages {
        let pairs: Vec<String> = ctx
            .catalog
            .supported_soc_packages()
            .into_iter()
            .filter(|pair| socs.iter().any(|soc| pair.starts_with(&format!("{soc}["))))
            .collect();
        if json {
            println!("{}", serde_json::to_string_pretty(&pairs)?);
        } else {
            for pair in pairs {
                println!("{pair}");
            }
        }
        return Ok(());
    }

    if json {
        let listing: serde_json::Map<String, serde_json::Value> = socs
            .iter()
            .map(|soc| (soc.clone(), json!(ctx.catalog.user_targets(soc))))
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for soc in &socs {
        println!("{soc}:");
        for target in ctx.catalog.user_targets(soc) {
            println!("  {soc}.{target}");
        }
    }
    Ok(())
}
