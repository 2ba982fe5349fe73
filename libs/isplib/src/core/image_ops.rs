// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pixel operations used by the built-in plugins.
//!
//! Plugins only see the [`ImageOps`] trait. [`CpuImageOps`] computes every
//! output row independently on the rayon pool, so results do not depend on
//! the number of worker threads.

use rayon::prelude::*;

use crate::core::error::{IspError, Result};
use crate::core::frames::{FrameBuffer, write_sample};
use crate::core::pixel_format::PixelFormat;

/// Convolution kernel with odd dimensions, weights in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    width: usize,
    height: usize,
    weights: Vec<f32>,
}

impl Kernel {
    pub fn new(width: usize, height: usize, weights: Vec<f32>) -> Result<Self> {
        if width % 2 == 0 || height % 2 == 0 {
            return Err(IspError::Configuration(format!(
                "kernel dimensions must be odd, got {}x{}",
                width, height
            )));
        }
        if weights.len() != width * height {
            return Err(IspError::Configuration(format!(
                "{}x{} kernel needs {} weights, got {}",
                width,
                height,
                width * height,
                weights.len()
            )));
        }
        Ok(Self {
            width,
            height,
            weights,
        })
    }

    /// 1x1 kernel multiplying every sample by `gain`.
    pub fn scalar(gain: f32) -> Self {
        Self {
            width: 1,
            height: 1,
            weights: vec![gain],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

pub trait ImageOps: Send + Sync {
    /// Reconstruct a colour image from an RGGB mosaic.
    fn demosaic(&self, src: &FrameBuffer, dst_format: PixelFormat) -> Result<FrameBuffer>;

    fn resize(&self, src: &FrameBuffer, width: u32, height: u32) -> Result<FrameBuffer>;

    /// Colour-space and bit-depth conversion between non-Bayer formats.
    fn convert_color(&self, src: &FrameBuffer, dst_format: PixelFormat) -> Result<FrameBuffer>;

    fn filter_2d(&self, src: &FrameBuffer, kernel: &Kernel) -> Result<FrameBuffer>;

    /// Map every sample through `lut`, which must cover the format's range.
    fn apply_lut(&self, src: &FrameBuffer, lut: &[u16]) -> Result<FrameBuffer>;
}

/// Rescale a sample between 8-bit and 16-bit depths.
#[inline]
pub fn rescale_sample(value: u16, from: PixelFormat, to: PixelFormat) -> u16 {
    match (from.bytes_per_channel(), to.bytes_per_channel()) {
        (1, 2) => value.saturating_mul(257),
        (2, 1) => value >> 8,
        _ => value,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuImageOps;

impl CpuImageOps {
    pub fn new() -> Self {
        Self
    }
}

/// Fill `dst` row by row in parallel. `pixel` writes all channels of (x, y).
fn fill_rows<F>(dst: &mut FrameBuffer, pixel: F)
where
    F: Fn(u32, u32, &mut [u16]) + Sync,
{
    let width = dst.width();
    let stride = dst.stride();
    let format = dst.format();
    let channels = format.channels();
    let bpc = format.bytes_per_channel();
    if stride == 0 {
        return;
    }

    dst.data_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let mut values = [0u16; 3];
            for x in 0..width {
                pixel(x, y as u32, &mut values[..channels]);
                let base = x as usize * channels * bpc;
                for (c, value) in values[..channels].iter().enumerate() {
                    let offset = base + c * bpc;
                    write_sample(&mut row[offset..offset + bpc], *value);
                }
            }
        });
}

fn check_not_empty(src: &FrameBuffer, op: &str) -> Result<()> {
    if src.is_empty() {
        return Err(IspError::FrameUnavailable(format!("{}: empty input frame", op)));
    }
    Ok(())
}

/// Channel order helpers: index of blue, green and red within a 3-channel pixel.
fn bgr_indices(format: PixelFormat) -> Option<[usize; 3]> {
    match format {
        PixelFormat::Bgr888 | PixelFormat::Bgr48 => Some([0, 1, 2]),
        PixelFormat::Rgb888 | PixelFormat::Rgb48 => Some([2, 1, 0]),
        _ => None,
    }
}

/// ITU-R BT.601 luma with 8-bit fixed-point weights.
#[inline]
fn luma(b: u16, g: u16, r: u16) -> u16 {
    ((29 * b as u32 + 150 * g as u32 + 77 * r as u32 + 128) >> 8) as u16
}

impl ImageOps for CpuImageOps {
    fn demosaic(&self, src: &FrameBuffer, dst_format: PixelFormat) -> Result<FrameBuffer> {
        check_not_empty(src, "demosaic")?;
        if !src.format().is_bayer() {
            return Err(IspError::UnsupportedConversion(format!(
                "demosaic expects a Bayer input, got {}",
                src.format()
            )));
        }
        let Some(order) = bgr_indices(dst_format) else {
            return Err(IspError::UnsupportedConversion(format!(
                "demosaic cannot produce {}",
                dst_format
            )));
        };

        let (w, h) = (src.width(), src.height());
        let from = src.format();
        let mut dst = FrameBuffer::new(w, h, dst_format);
        fill_rows(&mut dst, |x, y, out| {
            // RGGB superpixel containing (x, y); clamped at odd edges.
            let x0 = x & !1;
            let y0 = y & !1;
            let x1 = (x0 + 1).min(w - 1);
            let y1 = (y0 + 1).min(h - 1);
            let r = src.sample(x0, y0, 0);
            let g = ((src.sample(x1, y0, 0) as u32 + src.sample(x0, y1, 0) as u32) / 2) as u16;
            let b = src.sample(x1, y1, 0);
            out[order[0]] = rescale_sample(b, from, dst_format);
            out[order[1]] = rescale_sample(g, from, dst_format);
            out[order[2]] = rescale_sample(r, from, dst_format);
        });
        Ok(dst)
    }

    fn resize(&self, src: &FrameBuffer, width: u32, height: u32) -> Result<FrameBuffer> {
        check_not_empty(src, "resize")?;
        if width == 0 || height == 0 {
            return Err(IspError::Configuration(format!(
                "resize target must be non-zero, got {}x{}",
                width, height
            )));
        }
        if src.format().is_bayer() {
            return Err(IspError::UnsupportedConversion(format!(
                "resize would break the {} mosaic",
                src.format()
            )));
        }
        if src.width() == width && src.height() == height {
            return Ok(src.clone());
        }

        let (sw, sh) = (src.width() as u64, src.height() as u64);
        let mut dst = FrameBuffer::new(width, height, src.format());
        fill_rows(&mut dst, |x, y, out| {
            let sx = (x as u64 * sw / width as u64) as u32;
            let sy = (y as u64 * sh / height as u64) as u32;
            for (c, value) in out.iter_mut().enumerate() {
                *value = src.sample(sx, sy, c);
            }
        });
        Ok(dst)
    }

    fn convert_color(&self, src: &FrameBuffer, dst_format: PixelFormat) -> Result<FrameBuffer> {
        check_not_empty(src, "convert_color")?;
        let from = src.format();
        if from.is_bayer() || dst_format.is_bayer() {
            return Err(IspError::UnsupportedConversion(format!(
                "{} -> {} (use demosaic for Bayer data)",
                from, dst_format
            )));
        }
        if from == dst_format {
            return Ok(src.clone());
        }

        let src_order = bgr_indices(from);
        let dst_order = bgr_indices(dst_format);
        let mut dst = FrameBuffer::new(src.width(), src.height(), dst_format);
        fill_rows(&mut dst, |x, y, out| {
            let [b, g, r] = match src_order {
                Some([bi, gi, ri]) => [
                    src.sample(x, y, bi),
                    src.sample(x, y, gi),
                    src.sample(x, y, ri),
                ],
                None => {
                    let v = src.sample(x, y, 0);
                    [v, v, v]
                }
            };
            match dst_order {
                Some([bi, gi, ri]) => {
                    out[bi] = rescale_sample(b, from, dst_format);
                    out[gi] = rescale_sample(g, from, dst_format);
                    out[ri] = rescale_sample(r, from, dst_format);
                }
                None => out[0] = rescale_sample(luma(b, g, r), from, dst_format),
            }
        });
        Ok(dst)
    }

    fn filter_2d(&self, src: &FrameBuffer, kernel: &Kernel) -> Result<FrameBuffer> {
        check_not_empty(src, "filter_2d")?;
        let (w, h) = (src.width() as i64, src.height() as i64);
        let (kw, kh) = (kernel.width as i64, kernel.height as i64);
        let max = src.format().max_value() as f32;
        let mut dst = FrameBuffer::new(src.width(), src.height(), src.format());
        fill_rows(&mut dst, |x, y, out| {
            for (c, value) in out.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for ky in 0..kh {
                    let sy = (y as i64 + ky - kh / 2).clamp(0, h - 1) as u32;
                    for kx in 0..kw {
                        let sx = (x as i64 + kx - kw / 2).clamp(0, w - 1) as u32;
                        let weight = kernel.weights[(ky * kw + kx) as usize];
                        acc += weight * src.sample(sx, sy, c) as f32;
                    }
                }
                *value = acc.round().clamp(0.0, max) as u16;
            }
        });
        Ok(dst)
    }

    fn apply_lut(&self, src: &FrameBuffer, lut: &[u16]) -> Result<FrameBuffer> {
        check_not_empty(src, "apply_lut")?;
        let expected = src.format().max_value() as usize + 1;
        if lut.len() != expected {
            return Err(IspError::Configuration(format!(
                "{} needs a {}-entry table, got {}",
                src.format(),
                expected,
                lut.len()
            )));
        }
        let mut dst = FrameBuffer::new(src.width(), src.height(), src.format());
        fill_rows(&mut dst, |x, y, out| {
            for (c, value) in out.iter_mut().enumerate() {
                *value = lut[src.sample(x, y, c) as usize];
            }
        });
        Ok(dst)
    }
}
