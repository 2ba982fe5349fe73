// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Dynamic plugin loading for the isp CLI.
//!
//! Loads plugin types from dynamic libraries (.dylib/.so/.dll) at runtime and
//! registers them next to the built-ins. Instances are created and destroyed
//! through the library's exported factory and destructor.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use isplib::core::processors::PluginDescriptor;
use isplib::{IspPlugin, PluginRegistry};
use isplib_plugin_abi::{
    ForeignPlugin, ISPLIB_ABI_VERSION, PLUGIN_DECLARATION_SYMBOL, PluginDeclaration,
};
use libloading::Library;

/// Keeps loaded libraries alive. Each plugin created from a library holds
/// its own reference, so a library unloads only after its last instance is
/// destroyed.
pub struct PluginLoader {
    loaded_libraries: Vec<Arc<Library>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self {
            loaded_libraries: Vec::new(),
        }
    }

    /// Load a plugin library and register its plugin type with `registry`.
    ///
    /// Returns the registered type name.
    ///
    /// # Errors
    /// - Library failed to load
    /// - Missing `ISPLIB_PLUGIN` symbol
    /// - ABI version mismatch
    /// - The plugin's factory fails or its name is already registered
    pub fn load_plugin(&mut self, path: &Path, registry: &PluginRegistry) -> Result<String> {
        let lib = unsafe {
            Library::new(path)
                .with_context(|| format!("Failed to load plugin library: {}", path.display()))?
        };

        let decl: PluginDeclaration = unsafe {
            let symbol = lib
                .get::<*const PluginDeclaration>(PLUGIN_DECLARATION_SYMBOL)
                .with_context(|| {
                    format!(
                        "Plugin '{}' missing ISPLIB_PLUGIN symbol. \
                         Ensure the plugin uses the export_plugin! macro.",
                        path.display()
                    )
                })?;
            **symbol
        };

        if decl.abi_version != ISPLIB_ABI_VERSION {
            return Err(anyhow!(
                "ABI version mismatch for '{}': plugin has v{}, isp expects v{}. \
                 Rebuild the plugin with a compatible isplib-plugin-abi version.",
                path.display(),
                decl.abi_version,
                ISPLIB_ABI_VERSION
            ));
        }

        let lib = Arc::new(lib);

        // A probe instance tells us the type's name; it is destroyed right away.
        let name = {
            let probe = unsafe { ForeignPlugin::create(&decl, lib.clone())? };
            probe.name().to_string()
        };

        let descriptor = PluginDescriptor {
            name: name.clone(),
            description: format!("Dynamic plugin from {}", path.display()),
        };
        let keep_alive = Arc::clone(&lib);
        registry.register(
            descriptor,
            Box::new(move || {
                let plugin = unsafe { ForeignPlugin::create(&decl, keep_alive.clone())? };
                Ok(Box::new(plugin) as Box<dyn IspPlugin>)
            }),
        )?;

        self.loaded_libraries.push(lib);

        Ok(name)
    }

    /// Load every plugin library in `dir`.
    ///
    /// Failures for individual libraries are logged and skipped. Returns the
    /// number of plugin types registered.
    pub fn load_plugin_dir(&mut self, dir: &Path, registry: &PluginRegistry) -> Result<usize> {
        let mut total_registered = 0;

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read plugin directory: {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !is_plugin_library(&path) {
                continue;
            }
            match self.load_plugin(&path, registry) {
                Ok(name) => {
                    tracing::info!("Loaded plugin '{}' from '{}'", name, path.display());
                    total_registered += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to load plugin '{}': {:#}", path.display(), e);
                }
            }
        }

        Ok(total_registered)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_libraries.len()
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a file is a plugin library based on its extension.
fn is_plugin_library(path: &Path) -> bool {
    let extension = path.extension().and_then(|e| e.to_str());
    match extension {
        Some("dylib") => cfg!(target_os = "macos"),
        Some("so") => cfg!(target_os = "linux"),
        Some("dll") => cfg!(target_os = "windows"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_library_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a plugin").unwrap();
        std::fs::write(dir.path().join("isp_pipeline.yaml"), "plugins: []").unwrap();

        let registry = PluginRegistry::new();
        let mut loader = PluginLoader::new();
        assert_eq!(loader.load_plugin_dir(dir.path(), &registry).unwrap(), 0);
        assert_eq!(loader.loaded_count(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = PluginLoader::new();
        assert!(
            loader
                .load_plugin_dir(&dir.path().join("absent"), &PluginRegistry::new())
                .is_err()
        );
    }

    #[test]
    fn test_garbage_library_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libbroken.so");
        std::fs::write(&path, b"definitely not an ELF file").unwrap();

        let mut loader = PluginLoader::new();
        assert!(loader.load_plugin(&path, &PluginRegistry::new()).is_err());
        assert_eq!(loader.loaded_count(), 0);
    }

    #[test]
    fn test_library_extension_matches_platform() {
        assert_eq!(
            is_plugin_library(Path::new("libfoo.so")),
            cfg!(target_os = "linux")
        );
        assert!(!is_plugin_library(Path::new("libfoo.a")));
        assert!(!is_plugin_library(Path::new("plugin")));
    }
}
