// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::image_ops::{CpuImageOps, ImageOps};
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

/// BGR to gray, BGR or RGB at the same bit depth. The target is the active
/// output port, switched with `output_format`.
pub struct ColorConvertPlugin {
    ports: PortRegistry,
    ops: Arc<dyn ImageOps>,
}

impl ColorConvertPlugin {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(CpuImageOps::new()))
    }

    pub fn with_ops(ops: Arc<dyn ImageOps>) -> Self {
        let mut ports = PortRegistry::new();
        let bgr888_in = ports.add_input_port_candidate_spec(PixelFormat::Bgr888);
        let bgr48_in = ports.add_input_port_candidate_spec(PixelFormat::Bgr48);
        let outputs = [
            PixelFormat::Gray8,
            PixelFormat::Gray16,
            PixelFormat::Bgr888,
            PixelFormat::Bgr48,
            PixelFormat::Rgb888,
            PixelFormat::Rgb48,
        ]
        .map(|format| (format, ports.add_output_port_candidate_spec(format)));

        for (format, output) in outputs {
            let input = if format.bytes_per_channel() == 1 {
                bgr888_in
            } else {
                bgr48_in
            };
            if let Err(e) = ports.add_port_relation(input, output) {
                tracing::error!("color_convert: {}", e);
            }
        }
        // Default to pass-through at 8 bits.
        if let Err(e) = ports.change_output_port_spec(PixelFormat::Bgr888) {
            tracing::warn!("color_convert: default output: {}", e);
        }
        Self { ports, ops }
    }
}

impl Default for ColorConvertPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPlugin for ColorConvertPlugin {
    fn name(&self) -> &str {
        "color_convert"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
        Ok(())
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
        let src =
            src.ok_or_else(|| IspError::FrameUnavailable("color_convert: no input".into()))?;
        *dst = self.ops.convert_color(src, dst.format())?;
        Ok(())
    }

    fn end_process(&mut self) {}

    fn settings_fields(&self) -> Vec<SettingField> {
        Vec::new()
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[])
    }

    fn save_settings(&self, _settings: &mut PluginSettings) {}

    fn load_settings(&mut self, _reader: &mut SettingsReader<'_>) -> Result<()> {
        Ok(())
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(ColorConvertPlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "color_convert",
        description: "BGR to gray/BGR/RGB at the same bit depth",
        create,
    }
}
