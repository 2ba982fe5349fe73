// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! ABI-stable plugin interface for isplib dynamic plugin loading.
//!
//! A plugin library implements [`IspPlugin`] for one type and exports it with
//! [`export_plugin!`]. The exported declaration carries an ABI version, a
//! zero-argument factory returning a new instance and a destructor taking
//! that instance back. The host creates and releases plugins through exactly
//! this pair; [`ForeignPlugin`] wraps one instance so the destructor runs on
//! drop.
//!
//! # Example Plugin
//!
//! ```ignore
//! use isplib::core::prelude::*;
//! use isplib_plugin_abi::export_plugin;
//!
//! #[derive(Default)]
//! pub struct Invert { ports: PortRegistry }
//!
//! impl IspPlugin for Invert {
//!     fn name(&self) -> &str { "invert" }
//!     // ...
//! }
//!
//! export_plugin!(Invert);
//! ```
//!
//! # Plugin Cargo.toml
//!
//! ```toml
//! [lib]
//! crate-type = ["cdylib"]
//!
//! [dependencies]
//! isplib = "0.3"
//! isplib-plugin-abi = "0.3"
//! ```
//!
//! Host and plugin must be built with the same compiler and isplib version:
//! trait objects cross the library boundary.

use std::any::Any;
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::sync::Arc;

use isplib::core::display::DisplayContext;
use isplib::core::processors::{CommonParams, IspPlugin, PluginType};
use isplib::core::settings::{PluginSettings, SettingField, SettingsReader, SettingsUpdate};
use isplib::{FrameBuffer, ImageProcessingState, IspError, PortRegistry, Result};

pub use isplib;

/// Current ABI version. Plugins must match this exactly.
///
/// Increment when making breaking changes to the plugin interface.
pub const ISPLIB_ABI_VERSION: u32 = 1;

/// Name of the exported [`PluginDeclaration`] symbol.
pub const PLUGIN_DECLARATION_SYMBOL: &[u8] = b"ISPLIB_PLUGIN\0";

/// Returns a new instance, or null if construction failed.
pub type PluginCreateFn = extern "C" fn() -> *mut c_void;

/// Releases an instance returned by the paired [`PluginCreateFn`].
pub type PluginDestroyFn = unsafe extern "C" fn(*mut c_void);

/// Plugin declaration exported by dynamic libraries.
///
/// Plugins must export a static symbol named `ISPLIB_PLUGIN` of this type.
/// Use the [`export_plugin!`] macro to generate it.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PluginDeclaration {
    /// ABI version - must match [`ISPLIB_ABI_VERSION`].
    pub abi_version: u32,
    pub create: PluginCreateFn,
    pub destroy: PluginDestroyFn,
}

// Safety: PluginDeclaration contains only a version number and function pointers,
// all of which are Send + Sync.
unsafe impl Send for PluginDeclaration {}
unsafe impl Sync for PluginDeclaration {}

/// Construct `P` and leak it as an opaque handle. Used by [`export_plugin!`].
///
/// A panic during construction yields null instead of unwinding into the host.
pub fn create_handle<P>() -> *mut c_void
where
    P: IspPlugin + Default + 'static,
{
    match catch_unwind(|| Box::new(P::default()) as Box<dyn IspPlugin>) {
        Ok(plugin) => Box::into_raw(Box::new(plugin)).cast(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Release a handle made by [`create_handle`]. Null is ignored.
///
/// # Safety
/// `handle` must come from [`create_handle`] in the same library and must
/// not be used afterwards.
pub unsafe fn destroy_handle(handle: *mut c_void) {
    if handle.is_null() {
        return;
    }
    let plugin = unsafe { Box::from_raw(handle.cast::<Box<dyn IspPlugin>>()) };
    // A panicking Drop must not unwind across the boundary.
    let _ = catch_unwind(AssertUnwindSafe(move || drop(plugin)));
}

/// Export a plugin type for dynamic loading.
///
/// Generates the `ISPLIB_PLUGIN` symbol the host looks for. The type must
/// implement [`IspPlugin`] and [`Default`].
///
/// ```ignore
/// export_plugin!(Invert);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        extern "C" fn __isplib_plugin_create() -> *mut ::std::ffi::c_void {
            $crate::create_handle::<$plugin>()
        }

        unsafe extern "C" fn __isplib_plugin_destroy(handle: *mut ::std::ffi::c_void) {
            unsafe { $crate::destroy_handle(handle) }
        }

        #[unsafe(no_mangle)]
        pub static ISPLIB_PLUGIN: $crate::PluginDeclaration = $crate::PluginDeclaration {
            abi_version: $crate::ISPLIB_ABI_VERSION,
            create: __isplib_plugin_create,
            destroy: __isplib_plugin_destroy,
        };
    };
}

/// Host-side owner of one plugin instance created through a declaration.
///
/// Dropping it hands the instance back to the declaration's destructor, then
/// releases `keep_alive` (typically the loaded library).
pub struct ForeignPlugin {
    handle: NonNull<Box<dyn IspPlugin>>,
    destroy: PluginDestroyFn,
    _keep_alive: Arc<dyn Any + Send + Sync>,
}

// Safety: the handle owns a `Box<dyn IspPlugin>`, and `IspPlugin: Send`.
unsafe impl Send for ForeignPlugin {}

impl ForeignPlugin {
    /// Create an instance through `declaration`.
    ///
    /// # Safety
    /// `declaration` must come from a library kept loaded by `keep_alive`,
    /// built against this isplib version with the same compiler.
    pub unsafe fn create(
        declaration: &PluginDeclaration,
        keep_alive: Arc<dyn Any + Send + Sync>,
    ) -> Result<Self> {
        if declaration.abi_version != ISPLIB_ABI_VERSION {
            return Err(IspError::Configuration(format!(
                "plugin ABI v{} does not match host ABI v{}",
                declaration.abi_version, ISPLIB_ABI_VERSION
            )));
        }
        let handle = NonNull::new((declaration.create)().cast::<Box<dyn IspPlugin>>())
            .ok_or_else(|| {
                IspError::ResourceUnavailable("plugin factory returned no instance".to_string())
            })?;
        Ok(Self {
            handle,
            destroy: declaration.destroy,
            _keep_alive: keep_alive,
        })
    }

    fn inner(&self) -> &dyn IspPlugin {
        unsafe { self.handle.as_ref().as_ref() }
    }

    fn inner_mut(&mut self) -> &mut dyn IspPlugin {
        unsafe { self.handle.as_mut().as_mut() }
    }
}

impl Drop for ForeignPlugin {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.handle.as_ptr().cast()) }
    }
}

impl IspPlugin for ForeignPlugin {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn ports(&self) -> &PortRegistry {
        self.inner().ports()
    }

    fn ports_mut(&mut self) -> &mut PortRegistry {
        self.inner_mut().ports_mut()
    }

    fn plugin_type(&self) -> PluginType {
        self.inner().plugin_type()
    }

    fn init_process(&mut self, params: &CommonParams) -> Result<()> {
        self.inner_mut().init_process(params)
    }

    fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
        self.inner_mut().do_process(src, dst)
    }

    fn end_process(&mut self) {
        self.inner_mut().end_process()
    }

    fn settings_fields(&self) -> Vec<SettingField> {
        self.inner().settings_fields()
    }

    fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        self.inner_mut().apply_settings(update)
    }

    fn save_settings(&self, settings: &mut PluginSettings) {
        self.inner().save_settings(settings)
    }

    fn load_settings(&mut self, reader: &mut SettingsReader<'_>) -> Result<()> {
        self.inner_mut().load_settings(reader)
    }

    fn settings_editable_while_paused(&self) -> bool {
        self.inner().settings_editable_while_paused()
    }

    fn on_processing_state_changed(&mut self, state: ImageProcessingState) {
        self.inner_mut().on_processing_state_changed(state)
    }

    fn display_context(&self) -> Option<Arc<DisplayContext>> {
        self.inner().display_context()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use isplib::core::prelude::PixelFormat;
    use isplib::core::processors::{PluginDescriptor, PluginRegistry};

    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    struct Invert {
        ports: PortRegistry,
    }

    impl Default for Invert {
        fn default() -> Self {
            let mut ports = PortRegistry::new();
            let input = ports.add_input_port_candidate_spec(PixelFormat::Gray8);
            let output = ports.add_output_port_candidate_spec(PixelFormat::Gray8);
            ports
                .add_port_relation(input, output)
                .expect("ports registered above");
            Self { ports }
        }
    }

    impl Drop for Invert {
        fn drop(&mut self) {
            DROPPED.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl IspPlugin for Invert {
        fn name(&self) -> &str {
            "invert"
        }

        fn ports(&self) -> &PortRegistry {
            &self.ports
        }

        fn ports_mut(&mut self) -> &mut PortRegistry {
            &mut self.ports
        }

        fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
            Ok(())
        }

        fn do_process(&mut self, src: Option<&FrameBuffer>, dst: &mut FrameBuffer) -> Result<()> {
            let src = src.ok_or_else(|| IspError::FrameUnavailable("invert: no input".into()))?;
            *dst = src.clone();
            dst.data_mut().iter_mut().for_each(|v| *v = u8::MAX - *v);
            Ok(())
        }

        fn end_process(&mut self) {}

        fn settings_fields(&self) -> Vec<SettingField> {
            Vec::new()
        }

        fn apply_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
            update.ensure_known_keys(&[])
        }

        fn save_settings(&self, _settings: &mut PluginSettings) {}

        fn load_settings(&mut self, _reader: &mut SettingsReader<'_>) -> Result<()> {
            Ok(())
        }
    }

    export_plugin!(Invert);

    struct Exploding {
        ports: PortRegistry,
    }

    impl Default for Exploding {
        fn default() -> Self {
            panic!("sensor not found");
        }
    }

    impl IspPlugin for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }
        fn ports(&self) -> &PortRegistry {
            &self.ports
        }
        fn ports_mut(&mut self) -> &mut PortRegistry {
            &mut self.ports
        }
        fn init_process(&mut self, _params: &CommonParams) -> Result<()> {
            Ok(())
        }
        fn do_process(&mut self, _src: Option<&FrameBuffer>, _dst: &mut FrameBuffer) -> Result<()> {
            Ok(())
        }
        fn end_process(&mut self) {}
        fn settings_fields(&self) -> Vec<SettingField> {
            Vec::new()
        }
        fn apply_settings(&mut self, _update: &SettingsUpdate) -> Result<()> {
            Ok(())
        }
        fn save_settings(&self, _settings: &mut PluginSettings) {}
        fn load_settings(&mut self, _reader: &mut SettingsReader<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn keep_alive() -> Arc<dyn Any + Send + Sync> {
        Arc::new(())
    }

    #[test]
    fn test_foreign_plugin_runs_and_is_destroyed() {
        assert_eq!(ISPLIB_PLUGIN.abi_version, ISPLIB_ABI_VERSION);
        let before = DROPPED.load(Ordering::SeqCst);

        let registry = PluginRegistry::new();
        registry
            .register(
                PluginDescriptor {
                    name: "invert".to_string(),
                    description: "Invert 8-bit gray frames".to_string(),
                },
                Box::new(|| {
                    let plugin = unsafe { ForeignPlugin::create(&ISPLIB_PLUGIN, keep_alive())? };
                    Ok(Box::new(plugin) as Box<dyn IspPlugin>)
                }),
            )
            .unwrap();

        {
            let mut instance = registry.create_instance("invert", "inv").unwrap();
            assert_eq!(instance.type_name(), "invert");
            assert_eq!(instance.plugin_type(), PluginType::Transform);
            instance.init_process(&CommonParams::default()).unwrap();
            instance
                .set_processing_state(ImageProcessingState::Run)
                .unwrap();

            let frame = FrameBuffer::from_data(2, 1, PixelFormat::Gray8, vec![0, 200]).unwrap();
            let out = instance.process(Some(&frame)).unwrap();
            assert_eq!(out.data(), &[255, 55]);
        }
        assert_eq!(DROPPED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let declaration = PluginDeclaration {
            abi_version: ISPLIB_ABI_VERSION + 1,
            ..ISPLIB_PLUGIN
        };
        let err = unsafe { ForeignPlugin::create(&declaration, keep_alive()) }
            .err()
            .expect("mismatched ABI must fail");
        assert!(matches!(err, IspError::Configuration(_)));
    }

    #[test]
    fn test_panicking_factory_yields_null() {
        assert!(create_handle::<Exploding>().is_null());
        unsafe { destroy_handle(std::ptr::null_mut()) };
    }
}
