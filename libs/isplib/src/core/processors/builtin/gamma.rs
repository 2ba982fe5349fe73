// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Gamma correction, either from a power function or from a lookup table
//! file.
//!
//! Table files hold whitespace-separated integers, one per input code
//! (256 entries for 8-bit formats, 65536 for 16-bit ones).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use super::{TRANSFORM_FORMATS, identity_ports};
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::image_ops::{CpuImageOps, ImageOps};
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

const MODE_KEY: &str = "mode";
const GAMMA_KEY: &str = "gamma";
const TABLE_PATH_KEY: &str = "table_path";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GammaMode {
    Function,
    Table,
}

impl fmt::Display for GammaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Table => write!(f, "table"),
        }
    }
}

impl FromStr for GammaMode {
    type Err = IspError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "function" => Ok(Self::Function),
            "table" => Ok(Self::Table),
            other => Err(IspError::Configuration(format!(
                "gamma mode must be 'function' or 'table', got '{}'",
                other
            ))),
        }
    }
}

pub struct GammaPlugin {
    ports: PortRegistry,
    ops: Arc<dyn ImageOps>,
    mode: GammaMode,
    gamma: f64,
    table_path: PathBuf,
    /// Table file contents, read at init.
    table: Option<Vec<u16>>,
    /// LUT built for the format it was last used with.
    lut: Option<(PixelFormat, Vec<u16>)>,
}

impl GammaPlugin {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(CpuImageOps::new()))
    }

    pub fn with_ops(ops: Arc<dyn ImageOps>) -> Self {
        Self {
            ports: identity_ports(&TRANSFORM_FORMATS),
            ops,
            mode: GammaMode::Function,
            gamma: 2.2,
            table_path: PathBuf::new(),
            table: None,
            lut: None,
        }
    }

    pub fn mode(&self) -> GammaMode {
        self.mode
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn lut_for(&mut self, format: PixelFormat) -> Result<&[u16]> {
        let stale = !matches!(&self.lut, Some((cached, _)) if *cached == format);
        if stale {
            let lut = match self.mode {
                GammaMode::Function => power_lut(self.gamma, format.max_value()),
                GammaMode::Table => {
                    let table = self.table.as_ref().ok_or_else(|| {
                        IspError::InvalidState("gamma table not loaded".to_string())
                    })?;
                    check_table_len(table, format)?;
                    table.clone()
                }
            };
            self.lut = Some((format, lut));
        }
        Ok(self.lut.as_ref().map(|(_, lut)| lut.as_slice()).unwrap_or(&[]))
    }
}

impl Default for GammaPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn check_gamma(gamma: f64) -> Result<f64> {
    if gamma.is_finite() && gamma > 0.0 {
        Ok(gamma)
    } else {
        Err(IspError::Configuration(format!(
            "gamma must be greater than 0, got {}",
            gamma
        )))
    }
}

/// `out = max * (in / max) ^ (1 / gamma)`
fn power_lut(gamma: f64, max: u16) -> Vec<u16> {
    let max_f = max as f64;
    (0..=max)
        .map(|code| (max_f * (code as f64 / max_f).powf(1.0 / gamma)).round() as u16)
        .collect()
}

fn check_table_len(table: &[u16], format: PixelFormat) -> Result<()> {
    let expected = format.max_value() as usize + 1;
    if table.len() != expected {
        return Err(IspError::Configuration(format!(
            "gamma table has {} entries, {} needs {}",
            table.len(),
            format,
            expected
        )));
    }
    Ok(())
}

fn read_table(path: &Path) -> Result<Vec<u16>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IspError::ResourceUnavailable(format!("Not exist table file {}: {}", path.display(), e))
    })?;
    content
        .split_whitespace()
        .enumerate()
        .map(|(index, token)| {
            token.parse::<u16>().map_err(|e| {
                IspError::Configuration(format!(
                    "{} entry {}: '{}': {}",
                    path.display(),
                    index,
                    token,
                    e
                ))
            })
        })
        .collect()
}

impl IspPlugin for GammaPlugin {
    fn name(&self) -> &str {
        "gamma"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
        self.lut = None;
        match self.mode {
            GammaMode::Function => {
                check_gamma(self.gamma)?;
                self.table = None;
            }
            GammaMode::Table => {
                let table = read_table(&self.table_path)?;
                if let Some(format) = self.ports.active_input_format() {
                    check_table_len(&table, format)?;
                }
                tracing::debug!(
                    "gamma: loaded {} entries from {}",
                    table.len(),
                    self.table_path.display()
                );
                self.table = Some(table);
            }
        }
        Ok(())
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
        let src = src.ok_or_else(|| IspError::FrameUnavailable("gamma: no input".into()))?;
        let ops = Arc::clone(&self.ops);
        let lut = self.lut_for(src.format())?;
        *dst = ops.apply_lut(src, lut)?;
        Ok(())
    }

    fn end_process(&mut self) {
        self.table = None;
        self.lut = None;
    }

    fn settings_fields(&self) -> Vec<SettingField> {
        vec![
            SettingField::new(MODE_KEY, self.mode).with_choices(["function", "table"]),
            SettingField::new(GAMMA_KEY, format!("{:.3}", self.gamma)),
            SettingField::new(TABLE_PATH_KEY, self.table_path.display()),
        ]
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[MODE_KEY, GAMMA_KEY, TABLE_PATH_KEY])?;
        let mode = update.parse::<GammaMode>(MODE_KEY)?.unwrap_or(self.mode);
        let gamma = match update.parse::<f64>(GAMMA_KEY)? {
            Some(gamma) => check_gamma(gamma)?,
            None => self.gamma,
        };
        let table_path = update
            .get(TABLE_PATH_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.table_path.clone());

        self.mode = mode;
        self.gamma = gamma;
        self.table_path = table_path;
        self.lut = None;
        Ok(())
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        settings.add_line_plugin_settings(self.mode.to_string());
        settings.add_float(self.gamma);
        settings.add_line_plugin_settings(self.table_path.display().to_string());
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        let mode = reader.next_parsed::<GammaMode>()?;
        let gamma = check_gamma(reader.next_parsed()?)?;
        let table_path = PathBuf::from(reader.next_str()?);

        self.mode = mode;
        self.gamma = gamma;
        self.table_path = table_path;
        self.lut = None;
        Ok(())
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(GammaPlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "gamma",
        description: "Gamma correction by power function or lookup table",
        create,
    }
}
