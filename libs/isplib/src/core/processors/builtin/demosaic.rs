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

/// RGGB mosaic to BGR, keeping bit depth.
pub struct DemosaicPlugin {
    ports: PortRegistry,
    ops: Arc<dyn ImageOps>,
}

impl DemosaicPlugin {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(CpuImageOps::new()))
    }

    pub fn with_ops(ops: Arc<dyn ImageOps>) -> Self {
        let mut ports = PortRegistry::new();
        let rg8 = ports.add_input_port_candidate_spec(PixelFormat::BayerRg8);
        let rg16 = ports.add_input_port_candidate_spec(PixelFormat::BayerRg16);
        let bgr888 = ports.add_output_port_candidate_spec(PixelFormat::Bgr888);
        let bgr48 = ports.add_output_port_candidate_spec(PixelFormat::Bgr48);
        for (input, output) in [(rg8, bgr888), (rg16, bgr48)] {
            if let Err(e) = ports.add_port_relation(input, output) {
                tracing::error!("demosaic: {}", e);
            }
        }
        Self { ports, ops }
    }
}

impl Default for DemosaicPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPlugin for DemosaicPlugin {
    fn name(&self) -> &str {
        "demosaic"
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
        let src = src.ok_or_else(|| IspError::FrameUnavailable("demosaic: no input".into()))?;
        *dst = self.ops.demosaic(src, dst.format())?;
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
    Box::new(DemosaicPlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "demosaic",
        description: "Bayer RGGB to BGR reconstruction",
        create,
    }
}
