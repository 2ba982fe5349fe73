// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::sink_ports;
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

const PATH_KEY: &str = "path";
const APPEND_KEY: &str = "append";

/// Writes the raw bytes of every frame to a file.
pub struct RawFileSinkPlugin {
    ports: PortRegistry,
    path: PathBuf,
    append: bool,
    writer: Option<BufWriter<File>>,
    frames_written: u64,
}

impl RawFileSinkPlugin {
    pub fn new() -> Self {
        Self {
            ports: sink_ports(&PixelFormat::ALL),
            path: PathBuf::from("output.raw"),
            append: false,
            writer: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Default for RawFileSinkPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPlugin for RawFileSinkPlugin {
    fn name(&self) -> &str {
        "raw_file_sink"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(&self.path)
            .map_err(|e| {
                IspError::ResourceUnavailable(format!(
                    "cannot open '{}' for writing: {}",
                    self.path.display(),
                    e
                ))
            })?;
        self.writer = Some(BufWriter::new(file));
        self.frames_written = 0;
        Ok(())
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, _dst: &mut FrameBuffer) -> Result<()> {
        let src =
            src.ok_or_else(|| IspError::FrameUnavailable("raw_file_sink: no input".into()))?;
        let writer = self.writer.as_mut().ok_or_else(|| {
            IspError::ResourceUnavailable("raw_file_sink: writer not open".to_string())
        })?;
        writer.write_all(src.data())?;
        self.frames_written += 1;
        Ok(())
    }

    fn end_process(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!("raw_file_sink: flush of '{}' failed: {}", self.path.display(), e);
            }
            tracing::info!(
                "raw_file_sink: wrote {} frame(s) to '{}'",
                self.frames_written,
                self.path.display()
            );
        }
    }

    fn settings_fields(&self) -> Vec<SettingField> {
        vec![
            SettingField::new(PATH_KEY, self.path.display()),
            SettingField::new(APPEND_KEY, self.append).with_choices([true, false]),
        ]
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[PATH_KEY, APPEND_KEY])?;
        let append = update.parse::<bool>(APPEND_KEY)?.unwrap_or(self.append);
        if let Some(path) = update.get(PATH_KEY) {
            if path.trim().is_empty() {
                return Err(IspError::Configuration(
                    "raw_file_sink: path must not be empty".to_string(),
                ));
            }
            self.path = PathBuf::from(path);
        }
        self.append = append;
        Ok(())
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        settings.add_line_plugin_settings(self.path.display().to_string());
        settings.add_bool(self.append);
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        let path = PathBuf::from(reader.next_str()?);
        let append = reader.next_bool()?;
        self.path = path;
        self.append = append;
        Ok(())
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(RawFileSinkPlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "raw_file_sink",
        description: "Appends raw frame bytes to a file",
        create,
    }
}
