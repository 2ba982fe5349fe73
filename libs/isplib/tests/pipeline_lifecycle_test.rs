// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline lifecycle driven from a YAML config and the plugin registry.

use std::path::Path;

use isplib::core::events::NoticeLevel;
use isplib::{
    EventQueue, FrameOutcome, ImageProcessingState, IspError, IspPipeline, PipelineConfig,
    PluginLifecycleState, PluginRegistry, SettingsUpdate, UiEvent,
};

/// Source -> gamma -> display over a looping 2x2 GRAY8 file.
fn write_config(dir: &Path, gamma_settings: &str) -> PipelineConfig {
    let frames = dir.join("frames.raw");
    std::fs::write(&frames, [0u8, 64, 128, 255]).unwrap();

    let yaml = format!(
        r#"
frame_rate: 1000
settings_dir: state
plugins:
  - name: raw_file_source
    display_name: source
    settings:
      path: "{}"
      width: 2
      height: 2
      loop: true
  - name: gamma
    settings: {}
  - name: display
"#,
        frames.display(),
        gamma_settings
    );
    let path = dir.join(PipelineConfig::FILE_NAME);
    std::fs::write(&path, yaml).unwrap();
    PipelineConfig::load(dir).unwrap()
}

#[test]
fn test_builtins_are_registered() {
    let registry = PluginRegistry::with_builtins();
    for name in ["raw_file_source", "gain", "gamma", "display", "demosaic"] {
        assert!(registry.contains(name), "missing built-in '{}'", name);
    }
}

#[test]
fn test_failed_init_ends_earlier_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.lut");
    let config = write_config(
        dir.path(),
        &format!("{{ mode: table, table_path: \"{}\" }}", missing.display()),
    );
    let registry = PluginRegistry::with_builtins();
    let mut pipeline = IspPipeline::from_config(&config, &registry).unwrap();
    assert_eq!(pipeline.len(), 3);

    let err = pipeline.init().unwrap_err();
    assert!(matches!(err, IspError::ResourceUnavailable(_)), "{err}");
    assert!(err.to_string().contains("Not exist table file"));
    assert!(!pipeline.is_initialized());

    assert_eq!(
        pipeline.plugin(0).unwrap().state(),
        PluginLifecycleState::Disposed
    );
    assert_eq!(
        pipeline.plugin(1).unwrap().state(),
        PluginLifecycleState::Uninitialized
    );
    assert_eq!(
        pipeline.plugin(2).unwrap().state(),
        PluginLifecycleState::Uninitialized
    );

    // Fixing the setting makes the same pipeline initialisable.
    pipeline
        .apply_settings(1, &SettingsUpdate::new().with("mode", "function"))
        .unwrap();
    pipeline.init().unwrap();
    assert!(
        pipeline
            .plugins()
            .iter()
            .all(|p| p.state() == PluginLifecycleState::Stopped)
    );
}

#[test]
fn test_settings_locked_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{ gamma: 2.2 }");
    let mut pipeline =
        IspPipeline::from_config(&config, &PluginRegistry::with_builtins()).unwrap();
    pipeline.init().unwrap();
    pipeline.start().unwrap();
    assert_eq!(pipeline.process_frame().unwrap(), FrameOutcome::Processed);

    let gamma = SettingsUpdate::new().with("gamma", 1.8);
    assert!(matches!(
        pipeline.apply_settings(1, &gamma),
        Err(IspError::InvalidState(_))
    ));
    assert!(pipeline.open_settings(1).is_err());

    // Paused: only the display accepts changes.
    pipeline.pause().unwrap();
    assert!(pipeline.apply_settings(1, &gamma).is_err());
    let view = pipeline.open_settings(2).unwrap();
    assert_eq!(view.state, PluginLifecycleState::Paused);
    pipeline
        .apply_settings(2, &SettingsUpdate::new().with("scale", 0.5))
        .unwrap();
    assert!(pipeline.process_frame().is_err());

    pipeline.stop().unwrap();
    pipeline.apply_settings(1, &gamma).unwrap();
    let view = pipeline.open_settings(1).unwrap();
    assert!(view.fields.iter().any(|f| f.key == "gamma" && f.value == "1.800"));
    pipeline.close_settings(1).unwrap();
    assert!(!pipeline.plugin(1).unwrap().is_settings_open());
}

#[test]
fn test_lifecycle_order_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}");
    let mut pipeline =
        IspPipeline::from_config(&config, &PluginRegistry::with_builtins()).unwrap();

    assert!(pipeline.start().is_err());
    assert!(pipeline.process_frame().is_err());

    pipeline.init().unwrap();
    assert!(matches!(pipeline.init(), Err(IspError::InvalidState(_))));
    assert!(pipeline.resume().is_err());

    pipeline.start().unwrap();
    assert!(pipeline.start().is_err());
    pipeline.pause().unwrap();
    pipeline.resume().unwrap();
    assert_eq!(pipeline.state(), ImageProcessingState::Run);

    pipeline.end();
    assert_eq!(pipeline.state(), ImageProcessingState::Stop);
    assert!(!pipeline.is_initialized());
    assert!(
        pipeline
            .plugins()
            .iter()
            .all(|p| p.state() == PluginLifecycleState::Disposed)
    );

    // Ending twice is harmless and the chain can be initialised again.
    pipeline.end();
    pipeline.init().unwrap();
    pipeline.start().unwrap();
    assert_eq!(pipeline.process_frame().unwrap(), FrameOutcome::Processed);
}

#[test]
fn test_start_reinitialises_plugins_for_changed_ports() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{ gamma: 2.2 }");
    // Two GRAY8 frames or one GRAY16 frame.
    std::fs::write(dir.path().join("frames.raw"), [0u8, 0, 255, 255, 0, 128, 255, 255]).unwrap();
    let mut pipeline =
        IspPipeline::from_config(&config, &PluginRegistry::with_builtins()).unwrap();
    pipeline.init().unwrap();

    pipeline
        .apply_settings(0, &SettingsUpdate::new().with("output_format", "GRAY16"))
        .unwrap();
    pipeline.start().unwrap();
    assert_eq!(pipeline.process_frame().unwrap(), FrameOutcome::Processed);
    assert_eq!(
        pipeline.plugin(1).unwrap().ports().active_input_format(),
        Some(isplib::PixelFormat::Gray16)
    );
}

#[test]
fn test_start_refuses_when_new_ports_break_init() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("gamma8.lut");
    let entries: Vec<String> = (0..256).map(|code| code.to_string()).collect();
    std::fs::write(&table, entries.join(" ")).unwrap();
    let config = write_config(
        dir.path(),
        &format!("{{ mode: table, table_path: \"{}\" }}", table.display()),
    );
    std::fs::write(dir.path().join("frames.raw"), [0u8; 8]).unwrap();
    let mut pipeline =
        IspPipeline::from_config(&config, &PluginRegistry::with_builtins()).unwrap();
    pipeline.init().unwrap();

    pipeline
        .apply_settings(0, &SettingsUpdate::new().with("output_format", "GRAY16"))
        .unwrap();
    let err = pipeline.start().unwrap_err();
    assert!(matches!(err, IspError::Configuration(_)), "{err}");
    assert!(err.to_string().contains("256 entries"), "{err}");
    assert_eq!(pipeline.state(), ImageProcessingState::Stop);
    assert!(!pipeline.is_initialized());
    assert!(pipeline.process_frame().is_err());
}

#[test]
fn test_settings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{ gamma: 2.2 }");
    let registry = PluginRegistry::with_builtins();

    {
        let mut pipeline = IspPipeline::from_config(&config, &registry).unwrap();
        pipeline
            .apply_settings(1, &SettingsUpdate::new().with("gamma", 1.5))
            .unwrap();
        let written = pipeline.save_settings().unwrap();
        assert_eq!(written.len(), 3);
        assert!(written[0].ends_with("state/source.ini"));
        assert!(written.iter().all(|path| path.exists()));
    }

    let mut pipeline = IspPipeline::from_config(&config, &registry).unwrap();
    assert_eq!(pipeline.load_settings().unwrap(), 3);
    let view = pipeline.open_settings(1).unwrap();
    let gamma = view.fields.iter().find(|f| f.key == "gamma").unwrap();
    assert_eq!(gamma.value, "1.500");
}

#[test]
fn test_capture_events_drive_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}");
    let mut pipeline =
        IspPipeline::from_config(&config, &PluginRegistry::with_builtins()).unwrap();

    let events = EventQueue::new();
    let sender = events.sender();
    sender.post(UiEvent::Apply {
        plugin_index: 1,
        settings: SettingsUpdate::new().with("gamma", 0.0),
    });
    sender.post(UiEvent::CaptureInit);
    sender.post(UiEvent::CaptureUpdate);
    sender.post(UiEvent::CaptureUpdate);

    let report = events.drain(&mut pipeline);
    assert_eq!(report.handled, 4);
    assert_eq!(report.notices.len(), 1);
    assert_eq!(report.notices[0].level, NoticeLevel::Error);
    assert_eq!(pipeline.state(), ImageProcessingState::Run);
    assert_eq!(pipeline.frames_processed(), 2);

    sender.post(UiEvent::CaptureEnd);
    events.drain(&mut pipeline);
    assert!(!pipeline.is_initialized());
}

#[test]
fn test_unknown_plugin_in_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(PipelineConfig::FILE_NAME),
        "plugins:\n  - name: sharpen\n",
    )
    .unwrap();
    let config = PipelineConfig::load(dir.path()).unwrap();
    let err = IspPipeline::from_config(&config, &PluginRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, IspError::NotFound(_)), "{err}");
    assert!(err.to_string().contains("gamma"), "lists registered plugins: {err}");
}
