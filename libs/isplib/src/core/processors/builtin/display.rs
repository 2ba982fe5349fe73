// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::sink_ports;
use crate::core::display::DisplayContext;
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::lifecycle::ImageProcessingState;
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

const SCALE_KEY: &str = "scale";
const INSPECTOR_KEY: &str = "inspector";

/// Hands every frame to the display thread through a [`DisplayContext`].
pub struct DisplayPlugin {
    ports: PortRegistry,
    context: Arc<DisplayContext>,
    scale: f64,
    inspector: bool,
    processing_state: ImageProcessingState,
}

impl DisplayPlugin {
    pub fn new() -> Self {
        Self::with_context(Arc::new(DisplayContext::new()))
    }

    pub fn with_context(context: Arc<DisplayContext>) -> Self {
        Self {
            ports: sink_ports(&PixelFormat::ALL),
            context,
            scale: 1.0,
            inspector: true,
            processing_state: ImageProcessingState::Stop,
        }
    }

    pub fn context(&self) -> &Arc<DisplayContext> {
        &self.context
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn processing_state(&self) -> ImageProcessingState {
        self.processing_state
    }
}

impl Default for DisplayPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn check_scale(scale: f64) -> Result<f64> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(IspError::Configuration(format!(
            "display scale must be greater than 0, got {}",
            scale
        )))
    }
}

impl IspPlugin for DisplayPlugin {
    fn name(&self) -> &str {
        "display"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
        if self.context.queue().is_closed() {
            return Err(IspError::ResourceUnavailable(
                "display queue is closed".to_string(),
            ));
        }
        self.context.set_inspector_enabled(self.inspector);
        Ok(())
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, _dst: &mut FrameBuffer) -> Result<()> {
        let src = src.ok_or_else(|| IspError::FrameUnavailable("display: no input".into()))?;
        if !self.context.queue().enqueue(src) {
            tracing::debug!("display: queue closed, frame dropped");
        }
        Ok(())
    }

    fn end_process(&mut self) {}

    fn settings_fields(&self) -> Vec<SettingField> {
        vec![
            SettingField::new(SCALE_KEY, format!("{:.3}", self.scale)),
            SettingField::new(INSPECTOR_KEY, self.inspector).with_choices([true, false]),
        ]
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[SCALE_KEY, INSPECTOR_KEY])?;
        let scale = match update.parse::<f64>(SCALE_KEY)? {
            Some(scale) => check_scale(scale)?,
            None => self.scale,
        };
        let inspector = update.parse::<bool>(INSPECTOR_KEY)?.unwrap_or(self.inspector);

        self.scale = scale;
        self.inspector = inspector;
        self.context.set_inspector_enabled(inspector);
        Ok(())
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        settings.add_float(self.scale);
        settings.add_bool(self.inspector);
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        let scale = check_scale(reader.next_parsed()?)?;
        let inspector = reader.next_bool()?;
        self.scale = scale;
        self.inspector = inspector;
        self.context.set_inspector_enabled(inspector);
        Ok(())
    }

    fn settings_editable_while_paused(&self) -> bool {
        true
    }

    fn on_processing_state_changed(&mut self, state: ImageProcessingState) {
        self.processing_state = state;
    }

    fn display_context(&self) -> Option<Arc<DisplayContext>> {
        Some(Arc::clone(&self.context))
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(DisplayPlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "display",
        description: "Presents frames through a shared display queue",
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processors::PluginInstance;
    use crate::core::processors::builtin::test_support::{gray8, running};

    #[test]
    fn test_frames_reach_the_queue() {
        let plugin = DisplayPlugin::new();
        let context = Arc::clone(plugin.context());
        let mut instance = running(plugin);

        let out = instance.process(Some(&gray8(2, 1, &[7, 8]))).unwrap();
        assert!(out.is_empty());
        let shown = context.present().unwrap();
        assert_eq!(shown.data(), &[7, 8]);
        assert_eq!(context.queue().stats().enqueued, 1);
    }

    #[test]
    fn test_settings_editable_while_paused() {
        let mut instance = running(DisplayPlugin::new());
        let update = SettingsUpdate::new().with(SCALE_KEY, 2);
        assert!(instance.apply_settings(&update).is_err());

        instance
            .set_processing_state(ImageProcessingState::Pause)
            .unwrap();
        instance.apply_settings(&update).unwrap();
        assert!(instance.open_settings().is_ok());
    }

    #[test]
    fn test_inspector_setting_reaches_context() {
        let plugin = DisplayPlugin::new();
        let context = Arc::clone(plugin.context());
        let mut instance = PluginInstance::new("display", Box::new(plugin));
        instance
            .apply_settings(&SettingsUpdate::new().with(INSPECTOR_KEY, false))
            .unwrap();
        assert!(!context.inspector_enabled());
        assert!(instance.display_context().is_some());
    }

    #[test]
    fn test_closed_queue_blocks_init() {
        let plugin = DisplayPlugin::new();
        plugin.context().close();
        let mut instance = PluginInstance::new("display", Box::new(plugin));
        assert!(matches!(
            instance.init_process(&CommonParams::default()),
            Err(IspError::ResourceUnavailable(_))
        ));
    }
}
