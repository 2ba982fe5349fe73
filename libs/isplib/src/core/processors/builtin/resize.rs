// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::{TRANSFORM_FORMATS, identity_ports};
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::image_ops::{CpuImageOps, ImageOps};
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

const WIDTH_KEY: &str = "width";
const HEIGHT_KEY: &str = "height";

pub struct ResizePlugin {
    ports: PortRegistry,
    ops: Arc<dyn ImageOps>,
    width: u32,
    height: u32,
}

impl ResizePlugin {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(CpuImageOps::new()))
    }

    pub fn with_ops(ops: Arc<dyn ImageOps>) -> Self {
        Self {
            ports: identity_ports(&TRANSFORM_FORMATS),
            ops,
            width: 640,
            height: 480,
        }
    }

    pub fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for ResizePlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(IspError::Configuration(format!(
            "resize target must be non-zero, got {}x{}",
            width, height
        )));
    }
    Ok((width, height))
}

impl IspPlugin for ResizePlugin {
    fn name(&self) -> &str {
        "resize"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
        check_dimensions(self.width, self.height)?;
        Ok(())
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
        let src = src.ok_or_else(|| IspError::FrameUnavailable("resize: no input".into()))?;
        *dst = self.ops.resize(src, self.width, self.height)?;
        Ok(())
    }

    fn end_process(&mut self) {}

    fn settings_fields(&self) -> Vec<SettingField> {
        vec![
            SettingField::new(WIDTH_KEY, self.width),
            SettingField::new(HEIGHT_KEY, self.height),
        ]
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[WIDTH_KEY, HEIGHT_KEY])?;
        let width = update.parse::<u32>(WIDTH_KEY)?.unwrap_or(self.width);
        let height = update.parse::<u32>(HEIGHT_KEY)?.unwrap_or(self.height);
        (self.width, self.height) = check_dimensions(width, height)?;
        Ok(())
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        settings.add_int(self.width as i64);
        settings.add_int(self.height as i64);
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        let width = reader.next_parsed()?;
        let height = reader.next_parsed()?;
        (self.width, self.height) = check_dimensions(width, height)?;
        Ok(())
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(ResizePlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "resize",
        description: "Nearest-neighbour resize to a fixed size",
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processors::builtin::test_support::{gray8, running};

    #[test]
    fn test_resizes_to_target() {
        let mut plugin = ResizePlugin::new();
        plugin
            .apply_settings(&SettingsUpdate::new().with(WIDTH_KEY, 1).with(HEIGHT_KEY, 1))
            .unwrap();
        let mut instance = running(plugin);
        let out = instance.process(Some(&gray8(2, 2, &[9, 1, 1, 1]))).unwrap();
        assert_eq!((out.width(), out.height()), (1, 1));
        assert_eq!(out.data(), &[9]);
    }

    #[test]
    fn test_partial_update_is_atomic() {
        let mut plugin = ResizePlugin::new();
        let update = SettingsUpdate::new().with(WIDTH_KEY, 320).with(HEIGHT_KEY, 0);
        assert!(plugin.apply_settings(&update).is_err());
        assert_eq!(plugin.target(), (640, 480));

        plugin
            .apply_settings(&SettingsUpdate::new().with(HEIGHT_KEY, 240))
            .unwrap();
        assert_eq!(plugin.target(), (640, 240));
    }
}
