// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod builtin;
pub mod instance;
mod plugin;
mod registry;

pub use instance::{OUTPUT_FORMAT_KEY, PluginInstance};
pub use plugin::{CommonParams, IspPlugin, PluginDescriptor, PluginType};
pub use registry::{BuiltinPlugin, PluginFactoryFn, PluginRegistry};
