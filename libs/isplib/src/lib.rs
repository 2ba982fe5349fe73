// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Image-signal-processing pipeline core.
//!
//! Plugins declare candidate pixel formats per port and which input/output
//! pairs they can convert. [`IspPipeline`] negotiates one format per link,
//! drives plugins through their lifecycle and pushes frames through the
//! chain; display plugins hand frames to a presentation thread through a
//! triple-buffered [`FrameQueue`].

// Re-exported for `inventory::submit!` in downstream plugin crates.
pub use inventory;

pub mod core;

pub use crate::core::{
    ActivePortSelection, BuiltinPlugin, CommonParams, CpuImageOps, DisplayContext, ErrorScope,
    EventQueue, FrameBuffer, FrameOutcome, FrameQueue, ImageOps, ImageProcessingState,
    IspError, IspPipeline, IspPlugin, PipelineConfig, PipelineRunner, PixelFormat,
    PluginDescriptor, PluginInstance, PluginLifecycleState, PluginRegistry, PluginSettings,
    PluginSpec, PortRegistry, ResolutionPolicy, Result, RunnerOptions, SettingsUpdate,
    SettingsView, UiEvent, UiEventHandler, UiNotice,
};
