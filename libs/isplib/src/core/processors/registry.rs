// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::instance::PluginInstance;
use super::plugin::{IspPlugin, PluginDescriptor};
use crate::core::error::{IspError, Result};

/// Link-time registration entry for plugins compiled into the crate.
pub struct BuiltinPlugin {
    pub name: &'static str,
    pub description: &'static str,
    pub create: fn() -> Box<dyn IspPlugin>,
}

inventory::collect!(BuiltinPlugin);

/// Factory signature for plugins registered at runtime (e.g. from a shared library).
pub type PluginFactoryFn = Box<dyn Fn() -> Result<Box<dyn IspPlugin>> + Send + Sync>;

struct RegisteredPlugin {
    descriptor: PluginDescriptor,
    factory: PluginFactoryFn,
}

/// Plugin type name -> factory.
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, RegisteredPlugin>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry holding every plugin submitted with `inventory::submit!`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for builtin in inventory::iter::<BuiltinPlugin> {
            let create = builtin.create;
            let descriptor = PluginDescriptor {
                name: builtin.name.to_string(),
                description: builtin.description.to_string(),
            };
            if let Err(e) = registry.register(descriptor, Box::new(move || Ok(create()))) {
                tracing::warn!("[register] skipping built-in '{}': {}", builtin.name, e);
            }
        }
        registry
    }

    /// Register a plugin type. Names are unique.
    pub fn register(&self, descriptor: PluginDescriptor, factory: PluginFactoryFn) -> Result<()> {
        let mut plugins = self.plugins.write();
        if plugins.contains_key(&descriptor.name) {
            return Err(IspError::Configuration(format!(
                "plugin '{}' is already registered",
                descriptor.name
            )));
        }
        tracing::debug!("[register] plugin type registered '{}'", descriptor.name);
        plugins.insert(
            descriptor.name.clone(),
            RegisteredPlugin {
                descriptor,
                factory,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.read().contains_key(name)
    }

    /// Construct a bare plugin of type `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn IspPlugin>> {
        let plugins = self.plugins.read();
        let entry = plugins.get(name).ok_or_else(|| {
            IspError::NotFound(format!(
                "plugin '{}' (registered: {})",
                name,
                plugins.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        (entry.factory)()
    }

    /// Construct a plugin of type `name` wrapped for hosting.
    pub fn create_instance(&self, name: &str, instance_name: &str) -> Result<PluginInstance> {
        Ok(PluginInstance::new(instance_name, self.create(name)?))
    }

    /// Descriptors sorted by name.
    pub fn list(&self) -> Vec<PluginDescriptor> {
        self.plugins
            .read()
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }
}
