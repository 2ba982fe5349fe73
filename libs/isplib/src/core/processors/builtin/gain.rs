// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::{TRANSFORM_FORMATS, identity_ports};
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::image_ops::{CpuImageOps, ImageOps, Kernel};
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

const GAIN_KEY: &str = "gain";

/// Multiplies every sample by a constant, saturating at the format maximum.
pub struct GainPlugin {
    ports: PortRegistry,
    ops: Arc<dyn ImageOps>,
    gain: f64,
}

impl GainPlugin {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(CpuImageOps::new()))
    }

    pub fn with_ops(ops: Arc<dyn ImageOps>) -> Self {
        Self {
            ports: identity_ports(&TRANSFORM_FORMATS),
            ops,
            gain: 1.0,
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    fn check_gain(gain: f64) -> Result<f64> {
        if gain.is_finite() && gain >= 0.0 {
            Ok(gain)
        } else {
            Err(IspError::Configuration(format!(
                "gain must be a non-negative number, got {}",
                gain
            )))
        }
    }
}

impl Default for GainPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPlugin for GainPlugin {
    fn name(&self) -> &str {
        "gain"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
        Self::check_gain(self.gain)?;
        Ok(())
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
        let src = src.ok_or_else(|| IspError::FrameUnavailable("gain: no input".into()))?;
        *dst = self.ops.filter_2d(src, &Kernel::scalar(self.gain as f32))?;
        Ok(())
    }

    fn end_process(&mut self) {}

    fn settings_fields(&self) -> Vec<SettingField> {
        vec![SettingField::new(GAIN_KEY, format!("{:.3}", self.gain))]
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[GAIN_KEY])?;
        if let Some(gain) = update.parse::<f64>(GAIN_KEY)? {
            self.gain = Self::check_gain(gain)?;
        }
        Ok(())
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        settings.add_float(self.gain);
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        self.gain = Self::check_gain(reader.next_parsed()?)?;
        Ok(())
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(GainPlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "gain",
        description: "Constant gain on every sample",
        create,
    }
}
