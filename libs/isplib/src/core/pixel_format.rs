// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pixel format for frame buffers.
//!
//! Multi-byte samples are stored little-endian, channels interleaved in the
//! order the name spells (BGR = blue first).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{IspError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixelFormat {
    /// 8-bit grayscale.
    Gray8,
    /// 16-bit grayscale.
    Gray16,
    /// 24-bit BGR (8 bits/channel).
    Bgr888,
    /// 48-bit BGR (16 bits/channel).
    Bgr48,
    /// 24-bit RGB (8 bits/channel).
    Rgb888,
    /// 48-bit RGB (16 bits/channel).
    Rgb48,
    /// 8-bit Bayer mosaic, RGGB tile order.
    BayerRg8,
    /// 16-bit Bayer mosaic, RGGB tile order.
    BayerRg16,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 8] = [
        Self::Gray8,
        Self::Gray16,
        Self::Bgr888,
        Self::Bgr48,
        Self::Rgb888,
        Self::Rgb48,
        Self::BayerRg8,
        Self::BayerRg16,
    ];

    /// Number of interleaved channels per pixel.
    pub const fn channels(&self) -> usize {
        match self {
            Self::Gray8 | Self::Gray16 | Self::BayerRg8 | Self::BayerRg16 => 1,
            Self::Bgr888 | Self::Bgr48 | Self::Rgb888 | Self::Rgb48 => 3,
        }
    }

    /// Bytes per channel sample (1 or 2).
    pub const fn bytes_per_channel(&self) -> usize {
        match self {
            Self::Gray8 | Self::Bgr888 | Self::Rgb888 | Self::BayerRg8 => 1,
            Self::Gray16 | Self::Bgr48 | Self::Rgb48 | Self::BayerRg16 => 2,
        }
    }

    pub const fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.bytes_per_channel()
    }

    /// Largest sample value representable in this format.
    pub const fn max_value(&self) -> u16 {
        if self.bytes_per_channel() == 1 {
            u8::MAX as u16
        } else {
            u16::MAX
        }
    }

    pub const fn is_bayer(&self) -> bool {
        matches!(self, Self::BayerRg8 | Self::BayerRg16)
    }

    pub const fn is_color(&self) -> bool {
        self.channels() == 3
    }

    /// Stable name used in settings files and config.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Gray8 => "GRAY8",
            Self::Gray16 => "GRAY16",
            Self::Bgr888 => "BGR888",
            Self::Bgr48 => "BGR48",
            Self::Rgb888 => "RGB888",
            Self::Rgb48 => "RGB48",
            Self::BayerRg8 => "BAYER_RG8",
            Self::BayerRg16 => "BAYER_RG16",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = IspError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| IspError::Configuration(format!("Unknown pixel format '{}'", s)))
    }
}
