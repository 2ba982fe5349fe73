// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::plugin::{CommonParams, IspPlugin, PluginType};
use crate::core::display::DisplayContext;
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::lifecycle::{ImageProcessingState, LifecycleTracker, PluginLifecycleState};
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::{ActivePortSelection, PortRegistry};
use crate::core::settings::{PluginSettings, SettingField, SettingsUpdate, SettingsView};

/// Settings key handled by the host: switch the active output candidate.
pub const OUTPUT_FORMAT_KEY: &str = "output_format";

/// A named plugin plus the lifecycle bookkeeping around it.
pub struct PluginInstance {
    instance_name: String,
    plugin: Box<dyn IspPlugin>,
    lifecycle: LifecycleTracker,
    settings_open: bool,
}

impl PluginInstance {
    pub fn new(instance_name: impl Into<String>, plugin: Box<dyn IspPlugin>) -> Self {
        Self {
            instance_name: instance_name.into(),
            plugin,
            lifecycle: LifecycleTracker::new(),
            settings_open: false,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn type_name(&self) -> &str {
        self.plugin.name()
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin.plugin_type()
    }

    pub fn ports(&self) -> &PortRegistry {
        self.plugin.ports()
    }

    pub fn state(&self) -> PluginLifecycleState {
        self.lifecycle.state()
    }

    pub fn display_context(&self) -> Option<Arc<DisplayContext>> {
        self.plugin.display_context()
    }

    pub fn is_settings_open(&self) -> bool {
        self.settings_open
    }

    /// Overwrite the active selection. Only while frames are not flowing.
    pub fn set_active_selection(&mut self, selection: ActivePortSelection) -> Result<()> {
        self.ensure_not_processing("change ports")?;
        self.plugin.ports_mut().set_active_selection(selection)
    }

    pub fn init_process(&mut self, params: &CommonParams) -> Result<()> {
        self.lifecycle.ensure_can_init()?;
        self.plugin.ports().ensure_valid()?;
        self.plugin.ports().validate_active()?;

        if let Err(e) = self.plugin.init_process(params) {
            tracing::warn!("[{}] init_process failed: {}", self.instance_name, e);
            return Err(e);
        }
        self.lifecycle.mark_initialized()?;
        tracing::info!(
            "[{}] initialised ({}, {} -> {})",
            self.instance_name,
            self.plugin.name(),
            format_or_dash(self.ports().active_input_format()),
            format_or_dash(self.ports().active_output_format()),
        );
        Ok(())
    }

    pub fn set_processing_state(&mut self, state: ImageProcessingState) -> Result<()> {
        self.lifecycle.transition_to(state)?;
        self.plugin.on_processing_state_changed(state);
        tracing::debug!("[{}] -> {}", self.instance_name, self.lifecycle.state());
        Ok(())
    }

    /// Run one frame through the plugin and return its output.
    ///
    /// Sinks return an empty buffer of their input format.
    pub fn process(&mut self, src: Option<&FrameBuffer>) -> Result<FrameBuffer> {
        self.lifecycle.ensure_running()?;
        let ports = self.plugin.ports();
        ports.validate_active()?;

        let expected_input = ports.active_input_format();
        match (expected_input, src) {
            (Some(expected), Some(frame)) if frame.format() != expected => {
                return Err(IspError::UnsupportedConversion(format!(
                    "'{}' expects {}, got {}",
                    self.instance_name,
                    expected,
                    frame.format()
                )));
            }
            (Some(_), None) => {
                return Err(IspError::FrameUnavailable(format!(
                    "'{}' received no input frame",
                    self.instance_name
                )));
            }
            _ => {}
        }

        let dst_format = ports
            .active_output_format()
            .or(expected_input)
            .unwrap_or(PixelFormat::Gray8);
        let mut dst = FrameBuffer::empty(dst_format);
        self.plugin.do_process(src, &mut dst)?;
        Ok(dst)
    }

    /// Release resources. Safe from any state and when repeated.
    pub fn end_process(&mut self) {
        let was = self.lifecycle.state();
        self.plugin.end_process();
        self.lifecycle.dispose();
        self.settings_open = false;
        if was != PluginLifecycleState::Disposed {
            tracing::info!("[{}] ended (was {})", self.instance_name, was);
        }
    }

    pub fn open_settings(&mut self) -> Result<SettingsView> {
        self.ensure_settings_editable()?;
        self.settings_open = true;
        Ok(self.settings_view())
    }

    pub fn settings_view(&self) -> SettingsView {
        let mut fields = Vec::new();
        if let Some(current) = self.ports().active_output_format() {
            let choices = self.output_choices();
            if choices.len() > 1 {
                fields.push(SettingField::new(OUTPUT_FORMAT_KEY, current).with_choices(choices));
            }
        }
        fields.extend(self.plugin.settings_fields());
        SettingsView {
            plugin: self.plugin.name().to_string(),
            instance: self.instance_name.clone(),
            fields,
            state: self.lifecycle.state(),
        }
    }

    pub fn close_settings(&mut self) {
        self.settings_open = false;
    }

    /// Apply a batch of changes atomically, including an optional
    /// [`OUTPUT_FORMAT_KEY`] port change.
    pub fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        self.ensure_settings_editable()?;

        let mut rest = update.clone();
        let requested_output = rest
            .remove(OUTPUT_FORMAT_KEY)
            .map(|raw| raw.parse::<PixelFormat>())
            .transpose()?;

        let previous = self.ports().active();
        if let Some(format) = requested_output {
            self.plugin.ports_mut().change_output_port_spec(format)?;
        }

        if let Err(e) = self.plugin.apply_settings(&rest) {
            self.plugin.ports_mut().set_active_selection(previous)?;
            tracing::warn!("[{}] settings rejected: {}", self.instance_name, e);
            return Err(e);
        }
        tracing::debug!("[{}] settings applied", self.instance_name);
        Ok(())
    }

    pub fn settings_path(&self, settings_dir: &Path) -> PathBuf {
        PluginSettings::path_for(settings_dir, &self.instance_name)
    }

    /// Persist the port selection followed by the plugin's own fields.
    pub fn save_settings(&self, settings_dir: &Path) -> Result<PathBuf> {
        let mut settings = PluginSettings::new();
        settings.clear_plugin_settings();
        settings.add_port_selection(self.ports().active());
        self.plugin.save_settings(&mut settings);

        let path = self.settings_path(settings_dir);
        settings.save(&path)?;
        Ok(path)
    }

    /// Restore what [`save_settings`](Self::save_settings) wrote. Nothing
    /// changes when the file is short, malformed or names an invalid
    /// port selection.
    pub fn load_settings(&mut self, settings_dir: &Path) -> Result<()> {
        self.ensure_settings_editable()?;
        let path = self.settings_path(settings_dir);
        let settings = PluginSettings::load(&path)?;
        let mut reader = settings.reader();
        let selection = reader.next_port_selection()?;

        let previous = self.ports().active();
        let ports = self.plugin.ports_mut();
        ports.set_active_selection(selection)?;
        if let Err(e) = ports.validate_active() {
            ports.set_active_selection(previous)?;
            return Err(e);
        }

        if let Err(e) = self.plugin.load_settings(&mut reader) {
            self.plugin.ports_mut().set_active_selection(previous)?;
            return Err(e);
        }
        tracing::debug!("[{}] settings loaded from {}", self.instance_name, path.display());
        Ok(())
    }

    fn ensure_settings_editable(&self) -> Result<()> {
        let allowed_while_paused = self.plugin.settings_editable_while_paused();
        self.lifecycle
            .ensure_settings_editable(allowed_while_paused)
            .map_err(|e| IspError::InvalidState(format!("'{}': {}", self.instance_name, e)))
    }

    fn ensure_not_processing(&self, action: &str) -> Result<()> {
        match self.lifecycle.state() {
            PluginLifecycleState::Running | PluginLifecycleState::Paused => {
                Err(IspError::InvalidState(format!(
                    "cannot {} on '{}' while {}",
                    action,
                    self.instance_name,
                    self.lifecycle.state()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Output formats reachable from the active input.
    fn output_choices(&self) -> Vec<PixelFormat> {
        let ports = self.ports();
        if ports.is_source() {
            return ports.output_specs().iter().map(|spec| spec.format).collect();
        }
        let input = ports.active().active_input_index;
        ports
            .relations()
            .iter()
            .filter(|relation| relation.input_port_id == input)
            .filter_map(|relation| ports.output_spec(relation.output_port_id).ok())
            .map(|spec| spec.format)
            .collect()
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("instance_name", &self.instance_name)
            .field("type_name", &self.plugin.name())
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

fn format_or_dash(format: Option<PixelFormat>) -> &'static str {
    format.map(|f| f.name()).unwrap_or("-")
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        if self.lifecycle.state().is_initialized() {
            self.end_process();
        }
    }
}
