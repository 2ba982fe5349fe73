// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod frames;
pub mod image_ops;
pub mod lifecycle;
pub mod logging;
pub mod pacing;
pub mod pipeline;
pub mod pixel_format;
pub mod ports;
pub mod prelude;
pub mod processors;
pub mod settings;

pub use config::{PipelineConfig, PluginSpec};
pub use display::{DisplayContext, MouseEvent, MouseEventKind, PixelReading};
pub use error::{ErrorScope, IspError, Result};
pub use events::{EventQueue, EventSender, NoticeLevel, UiEvent, UiEventHandler, UiNotice};
pub use frames::{FrameBuffer, FrameQueue, FrameQueueStats};
pub use image_ops::{CpuImageOps, ImageOps, Kernel};
pub use lifecycle::{ImageProcessingState, PluginLifecycleState};
pub use pacing::FramePacer;
pub use pipeline::{
    FrameOutcome, IspPipeline, PipelineRunner, ResolutionPolicy, RunnerCounters, RunnerOptions,
    RunnerReport, StopReason,
};
pub use pixel_format::PixelFormat;
pub use ports::{ActivePortSelection, PortDirection, PortId, PortRegistry, PortRelation, PortSpec};
pub use processors::{
    BuiltinPlugin, CommonParams, IspPlugin, PluginDescriptor, PluginInstance, PluginRegistry,
    PluginType,
};
pub use settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate, SettingsView};
