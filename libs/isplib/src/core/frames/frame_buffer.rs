// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::error::{IspError, Result};
use crate::core::pixel_format::PixelFormat;

/// Owned 2-D pixel buffer.
///
/// Rows are tightly packed (`stride == width * bytes_per_pixel`). Cloning is
/// a deep copy, which is the only way a second owner gets the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Zero-filled buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Zero-size buffer; signals "not ready" to display consumers.
    pub fn empty(format: PixelFormat) -> Self {
        Self::new(0, 0, format)
    }

    /// Wrap existing pixel bytes. The length must match the declared layout.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let stride = width as usize * format.bytes_per_pixel();
        let expected = stride * height as usize;
        if data.len() != expected {
            return Err(IspError::Configuration(format!(
                "{}x{} {} frame needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            stride,
            data,
        })
    }

    /// Build a buffer from 16-bit samples (stored little-endian).
    pub fn from_samples_u16(
        width: u32,
        height: u32,
        format: PixelFormat,
        samples: &[u16],
    ) -> Result<Self> {
        if format.bytes_per_channel() != 2 {
            return Err(IspError::Configuration(format!(
                "{} is not a 16-bit format",
                format
            )));
        }
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_data(width, height, format, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when both buffers have the same dimensions and pixel format.
    pub fn same_layout(&self, other: &FrameBuffer) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    /// Copy pixels from a buffer of identical layout into this allocation.
    pub fn copy_from(&mut self, other: &FrameBuffer) -> Result<()> {
        if !self.same_layout(other) {
            return Err(IspError::Configuration(format!(
                "cannot copy {}x{} {} into {}x{} {}",
                other.width, other.height, other.format, self.width, self.height, self.format
            )));
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// Read one channel sample, widened to `u16`.
    ///
    /// Panics if the coordinate is out of bounds.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> u16 {
        let bpc = self.format.bytes_per_channel();
        let offset =
            y as usize * self.stride + (x as usize * self.format.channels() + channel) * bpc;
        read_sample(&self.data[offset..offset + bpc])
    }

    /// Write one channel sample, truncating to the format's depth.
    ///
    /// Panics if the coordinate is out of bounds.
    pub fn set_sample(&mut self, x: u32, y: u32, channel: usize, value: u16) {
        let bpc = self.format.bytes_per_channel();
        let offset =
            y as usize * self.stride + (x as usize * self.format.channels() + channel) * bpc;
        write_sample(&mut self.data[offset..offset + bpc], value);
    }
}

/// Decode one sample from its little-endian byte slice (1 or 2 bytes).
#[inline]
pub fn read_sample(bytes: &[u8]) -> u16 {
    match bytes {
        [b] => *b as u16,
        [lo, hi] => u16::from_le_bytes([*lo, *hi]),
        _ => 0,
    }
}

/// Encode one sample into its little-endian byte slice (1 or 2 bytes).
#[inline]
pub fn write_sample(bytes: &mut [u8], value: u16) {
    match bytes {
        [b] => *b = value.min(u8::MAX as u16) as u8,
        [lo, hi] => {
            let [l, h] = value.to_le_bytes();
            *lo = l;
            *hi = h;
        }
        _ => {}
    }
}
