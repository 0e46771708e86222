//! `inferport extensions`: the extension options a backend accepts.

use anyhow::{bail, Result};
use serde_json::Value;

use inferport_backends::extensions::type_label;

use crate::context::Context;

pub fn run(ctx: &Context, backend: &str, json: bool) -> Result<()> {
    let Some(entry) = ctx.registry.get(backend) else {
        bail!(
            "unknown backend '{backend}'. Registered backends: {}",
            ctx.registry.names().join(", ")
        );
    };
    let Some(schema) = entry.extension_schema() else {
        println!("Backend {backend} takes no extension options.");
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(schema)?);
        return Ok(());
    }

    println!("{:<20} {:<16} {:<10} Description", "Name", "Type", "Default");
    for row in option_rows(schema) {
        println!(
            "{:<20} {:<16} {:<10} {}",
            row.name, row.type_label, row.default, row.description
        );
    }
    Ok(())
}

#[derive(Debug, PartialEq)]
struct OptionRow {
    name: String,
    type_label: String,
    default: String,
    description: String,
}

/// One row per schema property, sorted by name; required ones are marked.
fn option_rows(schema: &Value) -> Vec<OptionRow> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut rows: Vec<OptionRow> = properties
        .iter()
        .map(|(name, property)| {
            let default = match property.get("default") {
                Some(value) => value.to_string(),
                None if required.contains(&name.as_str()) => "(required)".into(),
                None => "-".into(),
            };
            OptionRow {
                name: name.clone(),
                type_label: type_label(property),
                default,
                description: property
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}
