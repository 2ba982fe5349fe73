// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{Context, Result};
use isplib::PluginRegistry;
use isplib::core::ports::{PortRelation, PortSpec};
use isplib::core::processors::PluginType;
use serde::Serialize;

/// A registered plugin type with its port candidates.
#[derive(Debug, Serialize)]
pub struct PluginListing {
    pub name: String,
    pub description: String,
    pub role: PluginType,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    pub relations: Vec<PortRelation>,
}

/// Describe every registered plugin, probing a fresh instance for its ports.
pub fn listings(registry: &PluginRegistry) -> Result<Vec<PluginListing>> {
    registry
        .list()
        .into_iter()
        .map(|descriptor| {
            let plugin = registry
                .create(&descriptor.name)
                .with_context(|| format!("Failed to create plugin '{}'", descriptor.name))?;
            let ports = plugin.ports();
            Ok(PluginListing {
                role: plugin.plugin_type(),
                inputs: ports.input_specs().to_vec(),
                outputs: ports.output_specs().to_vec(),
                relations: ports.relations().to_vec(),
                name: descriptor.name,
                description: descriptor.description,
            })
        })
        .collect()
}

/// List all registered plugin types.
pub fn plugins(registry: &PluginRegistry, json: bool) -> Result<()> {
    let listings = listings(registry)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No plugins registered.");
        return Ok(());
    }

    println!("Available plugins ({}):\n", listings.len());

    for listing in &listings {
        println!("  {}", listing.name);
        if !listing.description.is_empty() {
            println!("    {}", listing.description);
        }
        println!("    Type: {}", listing.role);
        if !listing.inputs.is_empty() {
            println!("    Inputs:");
            for spec in &listing.inputs {
                println!("      - {} {}", spec.port_id, spec.format);
            }
        }
        if !listing.outputs.is_empty() {
            println!("    Outputs:");
            for spec in &listing.outputs {
                println!("      - {} {}", spec.port_id, spec.format);
            }
        }
        println!();
    }

    Ok(())
}
