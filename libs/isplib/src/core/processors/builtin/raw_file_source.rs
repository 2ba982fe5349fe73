// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Reads headerless fixed-size frames from a raw file.
//!
//! The output format is the active output port. Frame `n` starts at
//! `header_bytes + n * width * height * bytes_per_pixel`.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use super::source_ports;
use crate::core::error::{IspError, Result};
use crate::core::frames::FrameBuffer;
use crate::core::pacing::FramePacer;
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::PortRegistry;
use crate::core::processors::{BuiltinPlugin, CommonParams, IspPlugin};
use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};

const PATH_KEY: &str = "path";
const WIDTH_KEY: &str = "width";
const HEIGHT_KEY: &str = "height";
const HEADER_BYTES_KEY: &str = "header_bytes";
const LOOP_KEY: &str = "loop";

#[derive(Debug, Clone, PartialEq)]
struct RawSourceSettings {
    path: PathBuf,
    width: u32,
    height: u32,
    header_bytes: u64,
    looping: bool,
}

impl Default for RawSourceSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            width: 640,
            height: 480,
            header_bytes: 0,
            looping: false,
        }
    }
}

impl RawSourceSettings {
    fn validate(self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(IspError::Configuration(format!(
                "raw frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(self)
    }
}

/// Open file plus read position, held between init and end.
struct OpenRawFile {
    reader: BufReader<File>,
    frame_bytes: usize,
    frame_index: u64,
}

pub struct RawFileSourcePlugin {
    ports: PortRegistry,
    settings: RawSourceSettings,
    file: Option<OpenRawFile>,
    pacer: FramePacer,
}

impl RawFileSourcePlugin {
    pub fn new() -> Self {
        Self {
            ports: source_ports(&[
                PixelFormat::Gray8,
                PixelFormat::Gray16,
                PixelFormat::BayerRg8,
                PixelFormat::BayerRg16,
            ]),
            settings: RawSourceSettings::default(),
            file: None,
            pacer: FramePacer::new(Duration::ZERO),
        }
    }

    fn output_format(&self) -> Result<PixelFormat> {
        self.ports.active_output_format().ok_or_else(|| {
            IspError::InvalidState("raw_file_source: no active output".to_string())
        })
    }

    /// Frames read since init.
    pub fn frame_index(&self) -> Option<u64> {
        self.file.as_ref().map(|file| file.frame_index)
    }

    fn rewind(&mut self) -> Result<()> {
        let header = self.settings.header_bytes;
        if let Some(file) = self.file.as_mut() {
            file.reader.seek(SeekFrom::Start(header))?;
            file.frame_index = 0;
        }
        Ok(())
    }
}

impl Default for RawFileSourcePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPlugin for RawFileSourcePlugin {
    fn name(&self) -> &str {
        "raw_file_source"
    }

    fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    fn init_process(&mut self, params: &CommonParams) -> Result<()> {
        let format = self.output_format()?;
        let pacer = FramePacer::from_fps(params.frame_rate)?;
        let settings = &self.settings;
        let frame_bytes =
            settings.width as usize * settings.height as usize * format.bytes_per_pixel();

        let file = File::open(&settings.path).map_err(|e| {
            IspError::ResourceUnavailable(format!(
                "cannot open raw file '{}': {}",
                settings.path.display(),
                e
            ))
        })?;
        let length = file.metadata()?.len();
        if length < settings.header_bytes + frame_bytes as u64 {
            return Err(IspError::ResourceUnavailable(format!(
                "'{}' holds no complete {}x{} {} frame",
                settings.path.display(),
                settings.width,
                settings.height,
                format
            )));
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(settings.header_bytes))
            .map_err(|e| {
                IspError::ResourceUnavailable(format!(
                    "cannot seek to frame 0 of '{}': {}",
                    settings.path.display(),
                    e
                ))
            })?;

        tracing::info!(
            "raw_file_source: '{}' holds {} frame(s) of {} bytes",
            settings.path.display(),
            (length - settings.header_bytes) / frame_bytes as u64,
            frame_bytes
        );
        self.file = Some(OpenRawFile {
            reader,
            frame_bytes,
            frame_index: 0,
        });
        self.pacer = pacer;
        Ok(())
    }

    fn do_process(&mut self, _src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
        let format = dst.format();
        let (width, height) = (self.settings.width, self.settings.height);
        let looping = self.settings.looping;
        self.pacer.wait();

        let mut rewound = false;
        loop {
            let file = self.file.as_mut().ok_or_else(|| {
                IspError::ResourceUnavailable("raw_file_source: file not open".to_string())
            })?;
            let mut data = vec![0u8; file.frame_bytes];
            match file.reader.read_exact(&mut data) {
                Ok(()) => {
                    file.frame_index += 1;
                    *dst = FrameBuffer::from_data(width, height, format, data)?;
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    if looping && !rewound {
                        tracing::debug!("raw_file_source: end of file, rewinding");
                        self.rewind()?;
                        rewound = true;
                        continue;
                    }
                    return Err(IspError::FrameUnavailable(format!(
                        "end of '{}' after {} frame(s)",
                        self.settings.path.display(),
                        file.frame_index
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn end_process(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!("raw_file_source: closed '{}'", self.settings.path.display());
        }
        self.pacer.reset();
    }

    fn settings_fields(&self) -> Vec<SettingField> {
        let s = &self.settings;
        vec![
            SettingField::new(PATH_KEY, s.path.display()),
            SettingField::new(WIDTH_KEY, s.width),
            SettingField::new(HEIGHT_KEY, s.height),
            SettingField::new(HEADER_BYTES_KEY, s.header_bytes),
            SettingField::new(LOOP_KEY, s.looping).with_choices([true, false]),
        ]
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        update.ensure_known_keys(&[PATH_KEY, WIDTH_KEY, HEIGHT_KEY, HEADER_BYTES_KEY, LOOP_KEY])?;
        let current = &self.settings;
        let next = RawSourceSettings {
            path: update
                .get(PATH_KEY)
                .map(PathBuf::from)
                .unwrap_or_else(|| current.path.clone()),
            width: update.parse(WIDTH_KEY)?.unwrap_or(current.width),
            height: update.parse(HEIGHT_KEY)?.unwrap_or(current.height),
            header_bytes: update.parse(HEADER_BYTES_KEY)?.unwrap_or(current.header_bytes),
            looping: update.parse(LOOP_KEY)?.unwrap_or(current.looping),
        }
        .validate()?;
        self.settings = next;
        Ok(())
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        let s = &self.settings;
        settings.add_line_plugin_settings(s.path.display().to_string());
        settings.add_int(s.width as i64);
        settings.add_int(s.height as i64);
        settings.add_int(s.header_bytes as i64);
        settings.add_bool(s.looping);
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        let next = RawSourceSettings {
            path: PathBuf::from(reader.next_str()?),
            width: reader.next_parsed()?,
            height: reader.next_parsed()?,
            header_bytes: reader.next_parsed()?,
            looping: reader.next_bool()?,
        }
        .validate()?;
        self.settings = next;
        Ok(())
    }
}

fn create() -> Box<dyn IspPlugin> {
    Box::new(RawFileSourcePlugin::new())
}

inventory::submit! {
    BuiltinPlugin {
        name: "raw_file_source",
        description: "Fixed-size raw frames read from a file",
        create,
    }
}
