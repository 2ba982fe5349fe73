// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod port_registry;
mod port_spec;

pub use port_registry::PortRegistry;
pub use port_spec::{ActivePortSelection, PortDirection, PortId, PortRelation, PortSpec};
