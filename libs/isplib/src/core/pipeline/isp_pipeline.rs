// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linear plugin chain with a shared processing state.
//!
//! Lifecycle:
//! - `add_plugin` / settings / `resolve_ports` while stopped
//! - `init` resolves formats and initialises every plugin, or none
//! - `start` / `pause` / `resume` / `stop` move all plugins together
//! - `process_frame` drives one frame through the chain
//! - `end` releases every plugin

use std::path::PathBuf;
use std::sync::Arc;

use super::resolver::{ChainStage, ResolutionPolicy, resolve_port_chain};
use crate::core::config::PipelineConfig;
use crate::core::display::DisplayContext;
use crate::core::error::{ErrorScope, IspError, Result};
use crate::core::events::UiEventHandler;
use crate::core::frames::FrameBuffer;
use crate::core::lifecycle::ImageProcessingState;
use crate::core::ports::ActivePortSelection;
use crate::core::processors::{CommonParams, PluginInstance, PluginRegistry};
use crate::core::settings::{SettingsUpdate, SettingsView};

/// Result of one [`IspPipeline::process_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Processed,
    /// No new frame this tick; the reason names the plugin.
    Skipped(String),
}

pub struct IspPipeline {
    plugins: Vec<PluginInstance>,
    params: CommonParams,
    policy: ResolutionPolicy,
    state: ImageProcessingState,
    initialized: bool,
    /// Selections each plugin was last initialised with.
    init_selections: Vec<ActivePortSelection>,
    frames_processed: u64,
    frames_skipped: u64,
}

impl IspPipeline {
    pub fn new(params: CommonParams, policy: ResolutionPolicy) -> Self {
        Self {
            plugins: Vec::new(),
            params,
            policy,
            state: ImageProcessingState::Stop,
            initialized: false,
            init_selections: Vec::new(),
            frames_processed: 0,
            frames_skipped: 0,
        }
    }

    /// Instantiate the configured chain and apply each entry's settings.
    pub fn from_config(config: &PipelineConfig, registry: &PluginRegistry) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Self::new(config.common_params(), config.resolution_policy);
        for spec in &config.plugins {
            let mut instance = registry.create_instance(&spec.name, spec.instance_name())?;
            let update = SettingsUpdate::from_json(&spec.settings).map_err(|e| {
                IspError::Configuration(format!("plugin '{}': {}", spec.instance_name(), e))
            })?;
            if !update.is_empty() {
                instance.apply_settings(&update).map_err(|e| {
                    IspError::Configuration(format!("plugin '{}': {}", spec.instance_name(), e))
                })?;
            }
            pipeline.add_plugin(instance)?;
        }
        tracing::info!(
            "[pipeline] built {} plugin(s) from config",
            pipeline.plugins.len()
        );
        Ok(pipeline)
    }

    pub fn state(&self) -> ImageProcessingState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn params(&self) -> &CommonParams {
        &self.params
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ResolutionPolicy) -> Result<()> {
        self.ensure_stopped("change the resolution policy")?;
        self.policy = policy;
        Ok(())
    }

    pub fn plugins(&self) -> &[PluginInstance] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugin(&self, index: usize) -> Result<&PluginInstance> {
        self.plugins
            .get(index)
            .ok_or_else(|| IspError::NotFound(format!("plugin index {}", index)))
    }

    fn plugin_mut(&mut self, index: usize) -> Result<&mut PluginInstance> {
        self.plugins
            .get_mut(index)
            .ok_or_else(|| IspError::NotFound(format!("plugin index {}", index)))
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Append a plugin to the end of the chain.
    pub fn add_plugin(&mut self, instance: PluginInstance) -> Result<usize> {
        self.ensure_stopped("add plugins")?;
        if self.initialized {
            return Err(IspError::InvalidState(
                "cannot add plugins to an initialised pipeline; call end first".to_string(),
            ));
        }
        if self
            .plugins
            .iter()
            .any(|p| p.instance_name() == instance.instance_name())
        {
            return Err(IspError::Configuration(format!(
                "plugin instance '{}' already in the pipeline",
                instance.instance_name()
            )));
        }
        tracing::debug!(
            "[pipeline] added '{}' ({}) at {}",
            instance.instance_name(),
            instance.type_name(),
            self.plugins.len()
        );
        self.plugins.push(instance);
        Ok(self.plugins.len() - 1)
    }

    /// Negotiate formats for the whole chain and commit them, or change
    /// nothing.
    pub fn resolve_ports(&mut self) -> Result<Vec<ActivePortSelection>> {
        self.ensure_stopped("resolve ports")?;
        let selections = {
            let stages: Vec<ChainStage<'_>> = self
                .plugins
                .iter()
                .map(|p| ChainStage::new(p.instance_name(), p.ports()))
                .collect();
            resolve_port_chain(&stages, self.policy)?
        };

        let previous: Vec<ActivePortSelection> =
            self.plugins.iter().map(|p| p.ports().active()).collect();
        for (index, selection) in selections.iter().enumerate() {
            if let Err(e) = self.plugins[index].set_active_selection(*selection) {
                for (plugin, old) in self.plugins.iter_mut().zip(&previous).take(index) {
                    let _ = plugin.set_active_selection(*old);
                }
                return Err(e);
            }
        }
        Ok(selections)
    }

    /// Resolve formats and initialise every plugin. On failure the plugins
    /// already initialised are ended again and the pipeline stays
    /// uninitialised.
    pub fn init(&mut self) -> Result<()> {
        self.ensure_stopped("init")?;
        if self.initialized {
            return Err(IspError::InvalidState(
                "pipeline already initialised".to_string(),
            ));
        }
        if self.plugins.is_empty() {
            return Err(IspError::Configuration("pipeline has no plugins".to_string()));
        }
        for plugin in &self.plugins {
            plugin.ports().ensure_valid().map_err(|e| {
                IspError::PortRegistration(format!("plugin '{}': {}", plugin.instance_name(), e))
            })?;
        }
        self.resolve_ports()?;

        for index in 0..self.plugins.len() {
            if let Err(e) = self.plugins[index].init_process(&self.params) {
                tracing::error!(
                    "[pipeline] '{}' failed to initialise: {}",
                    self.plugins[index].instance_name(),
                    e
                );
                for plugin in self.plugins[..index].iter_mut().rev() {
                    plugin.end_process();
                }
                return Err(e);
            }
        }

        self.init_selections = self.plugins.iter().map(|p| p.ports().active()).collect();
        self.initialized = true;
        self.frames_processed = 0;
        self.frames_skipped = 0;
        tracing::info!("[pipeline] initialised {} plugin(s)", self.plugins.len());
        Ok(())
    }

    /// Stop -> Run. Formats are re-resolved first, so output changes made
    /// while stopped take effect. Plugins whose selection moved since init
    /// are initialised again; if any of them fails the whole pipeline is
    /// ended and stays stopped.
    pub fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(IspError::InvalidState(
                "pipeline must be initialised before start".to_string(),
            ));
        }
        self.ensure_stopped("start")?;
        self.resolve_ports()?;
        if let Err(e) = self.reinit_changed_plugins() {
            self.end();
            return Err(e);
        }
        self.transition(ImageProcessingState::Run)
    }

    fn reinit_changed_plugins(&mut self) -> Result<()> {
        for index in 0..self.plugins.len() {
            let current = self.plugins[index].ports().active();
            if self.init_selections.get(index) == Some(&current) {
                continue;
            }
            let plugin = &mut self.plugins[index];
            tracing::info!(
                "[pipeline] '{}' ports changed since init, initialising again",
                plugin.instance_name()
            );
            plugin.end_process();
            if let Err(e) = plugin.init_process(&self.params) {
                tracing::error!(
                    "[pipeline] '{}' failed to initialise for new ports: {}",
                    plugin.instance_name(),
                    e
                );
                return Err(e);
            }
            if let Some(slot) = self.init_selections.get_mut(index) {
                *slot = current;
            }
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.expect_state(ImageProcessingState::Run, "pause")?;
        self.transition(ImageProcessingState::Pause)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.expect_state(ImageProcessingState::Pause, "resume")?;
        self.transition(ImageProcessingState::Run)
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.state == ImageProcessingState::Stop {
            return Ok(());
        }
        self.transition(ImageProcessingState::Stop)
    }

    fn transition(&mut self, target: ImageProcessingState) -> Result<()> {
        for plugin in &mut self.plugins {
            plugin.set_processing_state(target)?;
        }
        tracing::info!("[pipeline] {} -> {}", self.state, target);
        self.state = target;
        Ok(())
    }

    /// Drive one frame from the source to the end of the chain.
    ///
    /// Frame-scoped failures (e.g. a source with nothing to read) skip the
    /// frame; any other failure is returned.
    pub fn process_frame(&mut self) -> Result<FrameOutcome> {
        self.expect_state(ImageProcessingState::Run, "process frames")?;

        let mut frame: Option<FrameBuffer> = None;
        for plugin in &mut self.plugins {
            match plugin.process(frame.as_ref()) {
                Ok(output) => frame = Some(output),
                Err(e) if e.scope() == ErrorScope::Frame => {
                    self.frames_skipped += 1;
                    tracing::debug!("[pipeline] frame skipped at '{}': {}", plugin.instance_name(), e);
                    return Ok(FrameOutcome::Skipped(format!(
                        "{}: {}",
                        plugin.instance_name(),
                        e
                    )));
                }
                Err(e) => {
                    tracing::error!("[pipeline] '{}' failed: {}", plugin.instance_name(), e);
                    return Err(e);
                }
            }
        }

        self.frames_processed += 1;
        Ok(FrameOutcome::Processed)
    }

    pub fn open_settings(&mut self, index: usize) -> Result<SettingsView> {
        self.plugin_mut(index)?.open_settings()
    }

    pub fn apply_settings(&mut self, index: usize, update: &SettingsUpdate) -> Result<()> {
        self.plugin_mut(index)?.apply_settings(update)
    }

    pub fn close_settings(&mut self, index: usize) -> Result<()> {
        self.plugin_mut(index)?.close_settings();
        Ok(())
    }

    /// Write every plugin's settings file. Returns the paths written.
    pub fn save_settings(&self) -> Result<Vec<PathBuf>> {
        self.plugins
            .iter()
            .map(|plugin| plugin.save_settings(&self.params.settings_dir))
            .collect()
    }

    /// Load settings files that exist. Returns how many were loaded.
    pub fn load_settings(&mut self) -> Result<usize> {
        let dir = self.params.settings_dir.clone();
        let mut loaded = 0;
        for plugin in &mut self.plugins {
            if !plugin.settings_path(&dir).exists() {
                tracing::debug!(
                    "[pipeline] no saved settings for '{}'",
                    plugin.instance_name()
                );
                continue;
            }
            plugin.load_settings(&dir)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Stop if needed and release every plugin, last first.
    pub fn end(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("[pipeline] stop during end failed: {}", e);
            self.state = ImageProcessingState::Stop;
        }
        for plugin in self.plugins.iter_mut().rev() {
            plugin.end_process();
        }
        if self.initialized {
            tracing::info!(
                "[pipeline] ended after {} frame(s), {} skipped",
                self.frames_processed,
                self.frames_skipped
            );
        }
        self.initialized = false;
    }

    /// Presentation contexts of the display plugins in the chain.
    pub fn display_contexts(&self) -> Vec<Arc<DisplayContext>> {
        self.plugins
            .iter()
            .filter_map(PluginInstance::display_context)
            .collect()
    }

    fn ensure_stopped(&self, action: &str) -> Result<()> {
        self.expect_state(ImageProcessingState::Stop, action)
    }

    fn expect_state(&self, expected: ImageProcessingState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(IspError::InvalidState(format!(
                "cannot {} while {} (requires {})",
                action, self.state, expected
            )))
        }
    }
}

impl Drop for IspPipeline {
    fn drop(&mut self) {
        if self.initialized {
            self.end();
        }
    }
}

impl std::fmt::Debug for IspPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IspPipeline")
            .field("plugins", &self.plugins)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Drives the pipeline directly from UI events on the owning thread.
impl UiEventHandler for IspPipeline {
    fn on_apply(&mut self, plugin_index: usize, settings: &SettingsUpdate) -> Result<()> {
        self.apply_settings(plugin_index, settings)
    }

    fn on_close(&mut self, plugin_index: usize) -> Result<()> {
        self.close_settings(plugin_index)
    }

    fn on_capture_init(&mut self) -> Result<()> {
        self.init()?;
        self.start()
    }

    fn on_capture_update(&mut self) -> Result<()> {
        self.process_frame().map(|_| ())
    }

    fn on_capture_end(&mut self) -> Result<()> {
        self.end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processors::builtin::display::DisplayPlugin;
    use crate::core::processors::builtin::gain::GainPlugin;
    use crate::core::processors::builtin::raw_file_source::RawFileSourcePlugin;

    fn params(dir: &std::path::Path) -> CommonParams {
        CommonParams {
            frame_rate: 1000.0,
            settings_dir: dir.join("settings"),
        }
    }

    fn raw_source(dir: &std::path::Path, bytes: &[u8]) -> PluginInstance {
        let path = dir.join("in.raw");
        std::fs::write(&path, bytes).unwrap();
        let mut instance = PluginInstance::new("source", Box::new(RawFileSourcePlugin::new()));
        instance
            .apply_settings(
                &SettingsUpdate::new()
                    .with("path", path.display())
                    .with("width", 2)
                    .with("height", 1),
            )
            .unwrap();
        instance
    }

    #[test]
    fn test_add_plugin_rejects_duplicate_names() {
        let mut pipeline = IspPipeline::new(CommonParams::default(), ResolutionPolicy::LookAhead);
        pipeline
            .add_plugin(PluginInstance::new("g", Box::new(GainPlugin::new())))
            .unwrap();
        assert!(pipeline
            .add_plugin(PluginInstance::new("g", Box::new(GainPlugin::new())))
            .is_err());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_init_requires_plugins() {
        let mut pipeline = IspPipeline::new(CommonParams::default(), ResolutionPolicy::LookAhead);
        assert!(matches!(pipeline.init(), Err(IspError::Configuration(_))));
    }

    #[test]
    fn test_frames_flow_to_display() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = IspPipeline::new(params(dir.path()), ResolutionPolicy::LookAhead);
        pipeline.add_plugin(raw_source(dir.path(), &[10, 20, 30, 40])).unwrap();
        let mut gain = PluginInstance::new("gain", Box::new(GainPlugin::new()));
        gain.apply_settings(&SettingsUpdate::new().with("gain", 2)).unwrap();
        pipeline.add_plugin(gain).unwrap();
        pipeline
            .add_plugin(PluginInstance::new("display", Box::new(DisplayPlugin::new())))
            .unwrap();

        let context = pipeline.display_contexts().pop().unwrap();
        pipeline.init().unwrap();
        pipeline.start().unwrap();

        assert_eq!(pipeline.process_frame().unwrap(), FrameOutcome::Processed);
        assert_eq!(context.present().unwrap().data(), &[20, 40]);
        assert_eq!(pipeline.process_frame().unwrap(), FrameOutcome::Processed);
        assert_eq!(context.present().unwrap().data(), &[60, 80]);

        match pipeline.process_frame().unwrap() {
            FrameOutcome::Skipped(reason) => assert!(reason.contains("source")),
            other => panic!("expected skip, got {:?}", other),
        }
        assert_eq!(pipeline.frames_processed(), 2);
        assert_eq!(pipeline.frames_skipped(), 1);

        pipeline.end();
        assert!(!pipeline.is_initialized());
    }

    #[test]
    fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = IspPipeline::new(params(dir.path()), ResolutionPolicy::LookAhead);
        pipeline.add_plugin(raw_source(dir.path(), &[1, 2])).unwrap();

        assert!(pipeline.start().is_err());
        pipeline.init().unwrap();
        assert!(pipeline.init().is_err());
        assert!(pipeline.resume().is_err());
        pipeline.start().unwrap();
        assert!(pipeline.start().is_err());
        pipeline.pause().unwrap();
        assert!(pipeline.process_frame().is_err());
        pipeline.resume().unwrap();
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), ImageProcessingState::Stop);
        assert!(pipeline
            .add_plugin(PluginInstance::new("g", Box::new(GainPlugin::new())))
            .is_err());
    }

    #[test]
    fn test_settings_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = IspPipeline::new(params(dir.path()), ResolutionPolicy::LookAhead);
        pipeline.add_plugin(raw_source(dir.path(), &[1, 2])).unwrap();
        pipeline
            .add_plugin(PluginInstance::new("gain", Box::new(GainPlugin::new())))
            .unwrap();

        let view = pipeline.open_settings(1).unwrap();
        assert_eq!(view.instance, "gain");
        assert!(pipeline.plugin(1).unwrap().is_settings_open());
        pipeline
            .apply_settings(1, &SettingsUpdate::new().with("gain", 3))
            .unwrap();
        pipeline.close_settings(1).unwrap();
        assert!(!pipeline.plugin(1).unwrap().is_settings_open());
        assert!(matches!(
            pipeline.open_settings(5),
            Err(IspError::NotFound(_))
        ));

        let written = pipeline.save_settings().unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("settings/gain.ini"));
        assert_eq!(pipeline.load_settings().unwrap(), 2);
    }
}
