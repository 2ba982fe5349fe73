// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::pixel_format::PixelFormat;

/// Index of a port candidate within one direction of one plugin.
pub type PortId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A candidate pixel format for one input or output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    pub port_id: PortId,
    pub direction: PortDirection,
    pub format: PixelFormat,
}

/// "When the active input is `input_port_id`, the output may be `output_port_id`."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRelation {
    pub input_port_id: PortId,
    pub output_port_id: PortId,
}

impl PortRelation {
    pub fn new(input_port_id: PortId, output_port_id: PortId) -> Self {
        Self {
            input_port_id,
            output_port_id,
        }
    }
}

/// The currently chosen input/output candidate indices of a plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivePortSelection {
    pub active_input_index: PortId,
    pub active_output_index: PortId,
}

impl ActivePortSelection {
    pub fn new(active_input_index: PortId, active_output_index: PortId) -> Self {
        Self {
            active_input_index,
            active_output_index,
        }
    }
}
