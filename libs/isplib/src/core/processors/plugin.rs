// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::display::DisplayContext;
use crate::core::error::Result;
use crate::core::frames::FrameBuffer;
use crate::core::lifecycle::ImageProcessingState;
use crate::core::ports::PortRegistry;
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

/// Role of a plugin in a chain, derived from its port candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginType {
    Source,
    Transform,
    Sink,
}

impl PluginType {
    pub fn of(ports: &PortRegistry) -> Self {
        if ports.is_source() {
            Self::Source
        } else if ports.is_sink() {
            Self::Sink
        } else {
            Self::Transform
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Transform => write!(f, "transform"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

/// Parameters shared by every plugin of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonParams {
    /// Declared frames per second; sources pace production with it.
    pub frame_rate: f64,
    pub settings_dir: PathBuf,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            settings_dir: PathBuf::from("settings"),
        }
    }
}

/// An image-processing stage.
///
/// Hosts never call these methods directly: [`PluginInstance`] enforces the
/// lifecycle around them.
///
/// Port candidates and relations are registered when the plugin is
/// constructed. `do_process` receives `None` as `src` for sources and writes
/// into `dst`, which arrives as an empty buffer of the active output format
/// and may be reshaped freely. Sinks leave `dst` untouched.
///
/// [`PluginInstance`]: super::PluginInstance
pub trait IspPlugin: Send {
    /// Registered type name, e.g. `"gamma"`.
    fn name(&self) -> &str;

    fn ports(&self) -> &PortRegistry;

    fn ports_mut(&mut self) -> &mut PortRegistry;

    fn plugin_type(&self) -> PluginType {
        PluginType::of(self.ports())
    }

    /// Acquire resources. Called once per init/end cycle.
    fn init_process(&mut self, params: &CommonParams) -> Result<()>;

    fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()>;

    /// Release handles and transient buffers. Must tolerate repeated calls.
    fn end_process(&mut self);

    /// Current parameter values for a settings surface.
    fn settings_fields(&self) -> Vec<SettingField>;

    /// Validate and commit a batch of parameter changes. On error nothing
    /// changes.
    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()>;

    /// Append plugin parameters after the port selection lines.
    fn save_settings(&self, settings: &mut PluginSettings);

    /// Read back what `save_settings` wrote. On error nothing changes.
    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()>;

    /// Whether the settings surface stays usable while paused.
    fn settings_editable_while_paused(&self) -> bool {
        false
    }

    fn on_processing_state_changed(&mut self, _state: ImageProcessingState) {}

    /// Display plugins expose their presentation context to the host.
    fn display_context(&self) -> Option<Arc<DisplayContext>> {
        None
    }
}

/// Describes a registered plugin type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub description: String,
}
