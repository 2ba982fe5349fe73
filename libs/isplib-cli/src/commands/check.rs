// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{Context, Result};
use isplib::core::processors::PluginType;
use isplib::{IspPipeline, PipelineConfig, PixelFormat, PluginRegistry};
use serde::Serialize;

/// One resolved link of the chain.
#[derive(Debug, Serialize)]
pub struct StageReport {
    pub index: usize,
    pub instance: String,
    pub plugin: String,
    pub role: PluginType,
    pub input: Option<PixelFormat>,
    pub output: Option<PixelFormat>,
}

/// Build the configured chain and negotiate its formats without running it.
pub fn resolve(config: &PipelineConfig, registry: &PluginRegistry) -> Result<Vec<StageReport>> {
    let mut pipeline =
        IspPipeline::from_config(config, registry).context("Failed to build pipeline")?;
    pipeline
        .load_settings()
        .context("Failed to load saved settings")?;
    pipeline
        .resolve_ports()
        .context("Plugin formats do not chain")?;

    Ok(pipeline
        .plugins()
        .iter()
        .enumerate()
        .map(|(index, plugin)| StageReport {
            index,
            instance: plugin.instance_name().to_string(),
            plugin: plugin.type_name().to_string(),
            role: plugin.plugin_type(),
            input: plugin.ports().active_input_format(),
            output: plugin.ports().active_output_format(),
        })
        .collect())
}

pub fn run(config: &PipelineConfig, registry: &PluginRegistry, json: bool) -> Result<()> {
    let stages = resolve(config, registry)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stages)?);
        return Ok(());
    }

    if stages.is_empty() {
        println!("Pipeline has no plugins.");
        return Ok(());
    }

    println!("Pipeline resolves ({} plugins):\n", stages.len());
    for stage in &stages {
        println!(
            "  {}. {} ({}, {}): {} -> {}",
            stage.index,
            stage.instance,
            stage.plugin,
            stage.role,
            format_or_dash(stage.input),
            format_or_dash(stage.output)
        );
    }
    Ok(())
}

fn format_or_dash(format: Option<PixelFormat>) -> &'static str {
    format.map(|f| f.name()).unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reports_each_stage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PipelineConfig::FILE_NAME),
            r#"
plugins:
  - name: raw_file_source
    settings: { output_format: GRAY16 }
  - name: gain
  - name: display
"#,
        )
        .unwrap();
        let config = PipelineConfig::load(dir.path()).unwrap();

        let stages = resolve(&config, &PluginRegistry::with_builtins()).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].role, PluginType::Source);
        assert_eq!(stages[0].input, None);
        assert_eq!(stages[1].input, Some(PixelFormat::Gray16));
        assert_eq!(stages[1].output, Some(PixelFormat::Gray16));
        assert_eq!(stages[2].output, None);
    }

    #[test]
    fn test_resolve_rejects_broken_chain() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PipelineConfig::FILE_NAME),
            "plugins:\n  - name: display\n  - name: gain\n",
        )
        .unwrap();
        let config = PipelineConfig::load(dir.path()).unwrap();
        assert!(resolve(&config, &PluginRegistry::with_builtins()).is_err());
    }
}
