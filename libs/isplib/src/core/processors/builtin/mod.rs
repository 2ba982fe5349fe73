// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Plugins compiled into the crate. Each module submits a
//! [`BuiltinPlugin`](super::BuiltinPlugin) entry.

pub mod color_convert;
pub mod demosaic;
pub mod display;
pub mod gain;
pub mod gamma;
pub mod raw_file_sink;
pub mod raw_file_source;
pub mod resize;

use crate::core::pixel_format::PixelFormat;
use crate::core::ports::PortRegistry;

/// Formats the per-pixel transforms (gain, gamma, resize) operate on.
pub const TRANSFORM_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Gray8,
    PixelFormat::Gray16,
    PixelFormat::Bgr888,
    PixelFormat::Bgr48,
];

/// One input and one output per format, related one-to-one.
pub(crate) fn identity_ports(formats: &[PixelFormat]) -> PortRegistry {
    let mut ports = PortRegistry::new();
    for &format in formats {
        let input = ports.add_input_port_candidate_spec(format);
        let output = ports.add_output_port_candidate_spec(format);
        if let Err(e) = ports.add_port_relation(input, output) {
            tracing::error!("identity relation for {}: {}", format, e);
        }
    }
    ports
}

pub(crate) fn sink_ports(formats: &[PixelFormat]) -> PortRegistry {
    let mut ports = PortRegistry::new();
    for &format in formats {
        ports.add_input_port_candidate_spec(format);
    }
    ports
}

pub(crate) fn source_ports(formats: &[PixelFormat]) -> PortRegistry {
    let mut ports = PortRegistry::new();
    for &format in formats {
        ports.add_output_port_candidate_spec(format);
    }
    ports
}
