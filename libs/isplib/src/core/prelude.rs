// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Everything a plugin implementation needs.

pub use crate::core::error::{IspError, Result};
pub use crate::core::frames::FrameBuffer;
pub use crate::core::image_ops::{CpuImageOps, ImageOps, Kernel};
pub use crate::core::lifecycle::ImageProcessingState;
pub use crate::core::pixel_format::PixelFormat;
pub use crate::core::ports::{ActivePortSelection, PortRegistry};
pub use crate::core::processors::{CommonParams, IspPlugin};
pub use crate::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};
