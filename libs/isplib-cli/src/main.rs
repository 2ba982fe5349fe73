// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! isp CLI
//!
//! Command-line host for isplib pipelines.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod plugin_loader;

use commands::PluginArgs;
use commands::run::RunArgs;
use plugin_loader::PluginLoader;

#[derive(Parser)]
#[command(name = "isp")]
#[command(author, version, about = "Image-signal-processing pipeline host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct PluginOptions {
    /// Plugin libraries to load (can be specified multiple times)
    #[arg(long = "plugin", value_name = "PATH")]
    plugins: Vec<PathBuf>,

    /// Directory containing plugin libraries
    #[arg(long = "plugin-dir", value_name = "DIR")]
    plugin_dir: Option<PathBuf>,
}

impl From<PluginOptions> for PluginArgs {
    fn from(options: PluginOptions) -> Self {
        Self {
            plugins: options.plugins,
            plugin_dir: options.plugin_dir,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available plugin types
    Plugins {
        #[command(flatten)]
        plugin_options: PluginOptions,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a pipeline and negotiate its formats without running it
    Check {
        /// Pipeline config file, or a directory holding isp_pipeline.yaml
        #[arg(value_name = "CONFIG", default_value = ".")]
        config: PathBuf,

        #[command(flatten)]
        plugin_options: PluginOptions,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a pipeline until it stops or Ctrl+C
    Run {
        /// Pipeline config file, or a directory holding isp_pipeline.yaml
        #[arg(value_name = "CONFIG", default_value = ".")]
        config: PathBuf,

        #[command(flatten)]
        plugin_options: PluginOptions,

        /// Stop after this many processed frames
        #[arg(long)]
        frames: Option<u64>,

        /// Stop after this many consecutive frames without input
        #[arg(long, value_name = "N")]
        idle_frames: Option<u64>,

        /// Do not write settings files on exit
        #[arg(long)]
        no_save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    isplib::core::logging::init();

    let mut loader = PluginLoader::new();

    match cli.command {
        Commands::Plugins {
            plugin_options,
            json,
        } => {
            let registry = commands::build_registry(&mut loader, &plugin_options.into(), None)?;
            commands::list::plugins(&registry, json)?;
        }
        Commands::Check {
            config,
            plugin_options,
            json,
        } => {
            let config = commands::load_config(&config)?;
            let registry =
                commands::build_registry(&mut loader, &plugin_options.into(), Some(&config))?;
            commands::check::run(&config, &registry, json)?;
        }
        Commands::Run {
            config,
            plugin_options,
            frames,
            idle_frames,
            no_save,
        } => {
            let config = commands::load_config(&config)?;
            let registry =
                commands::build_registry(&mut loader, &plugin_options.into(), Some(&config))?;
            commands::run::run(
                &config,
                &registry,
                &RunArgs {
                    frames,
                    idle_frames,
                    no_save,
                },
            )?;
        }
    }

    tracing::debug!("{} plugin library(ies) loaded", loader.loaded_count());
    Ok(())
}
