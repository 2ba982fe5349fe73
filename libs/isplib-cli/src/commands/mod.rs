// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod check;
pub mod list;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use isplib::{PipelineConfig, PluginRegistry};

use crate::plugin_loader::PluginLoader;

/// Plugin libraries named on the command line.
#[derive(Debug, Clone, Default)]
pub struct PluginArgs {
    pub plugins: Vec<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
}

/// Load `isp_pipeline.yaml` from a file path or a directory holding one.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = if path.is_dir() {
        PipelineConfig::load(path)
    } else {
        PipelineConfig::load_from_file(path)
    };
    config.with_context(|| format!("Invalid pipeline config '{}'", path.display()))
}

/// Built-ins plus every plugin library from the command line and the config.
pub fn build_registry(
    loader: &mut PluginLoader,
    args: &PluginArgs,
    config: Option<&PipelineConfig>,
) -> Result<PluginRegistry> {
    let registry = PluginRegistry::with_builtins();

    for path in &args.plugins {
        let name = loader.load_plugin(path, &registry)?;
        tracing::info!("Loaded plugin '{}' from '{}'", name, path.display());
    }

    let config_dirs = config.map(|c| c.plugin_dirs.as_slice()).unwrap_or_default();
    for dir in args.plugin_dir.iter().chain(config_dirs) {
        loader.load_plugin_dir(dir, &registry)?;
    }

    Ok(registry)
}
