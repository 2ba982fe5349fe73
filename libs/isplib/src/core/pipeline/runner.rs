// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Processing thread that owns an [`IspPipeline`] while it runs.
//!
//! Commands are handled between frames. A paused runner blocks on the command
//! channel instead of spinning. Stopping returns the pipeline (stopped, still
//! initialised) so the caller can save settings and end it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::isp_pipeline::{FrameOutcome, IspPipeline};
use crate::core::error::{IspError, Result};
use crate::core::events::{EventSender, UiEventHandler, UiNotice};
use crate::core::settings::SettingsUpdate;

enum RunnerCommand {
    Pause,
    Resume,
    Stop,
    Apply {
        plugin_index: usize,
        settings: SettingsUpdate,
        reply: Sender<Result<()>>,
    },
    Close {
        plugin_index: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    /// Stop after this many consecutive skipped frames (e.g. a source at EOF).
    pub max_consecutive_skips: Option<u64>,
    /// Where skip and failure notices are posted.
    pub notices: Option<EventSender>,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerCounters {
    pub processed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    FrameLimit,
    SourceIdle,
    Failed,
}

/// What the processing thread hands back on join.
#[derive(Debug)]
pub struct RunnerReport {
    pub pipeline: IspPipeline,
    pub counters: RunnerCounters,
    pub reason: StopReason,
    /// The fatal error when `reason` is [`StopReason::Failed`].
    pub error: Option<IspError>,
}

pub struct PipelineRunner {
    commands: Sender<RunnerCommand>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<RunnerReport>>,
}

impl PipelineRunner {
    /// Start `pipeline` and drive it on a new thread. The pipeline must be
    /// initialised.
    pub fn spawn(mut pipeline: IspPipeline, options: RunnerOptions) -> Result<Self> {
        pipeline.start()?;

        let (commands, receiver) = crossbeam_channel::unbounded();
        let counters = Arc::new(Counters::default());
        let thread_counters = Arc::clone(&counters);

        let handle = std::thread::Builder::new()
            .name("isp-runner".to_string())
            .spawn(move || run_loop(pipeline, receiver, options, thread_counters))?;

        tracing::info!("[runner] processing thread started");
        Ok(Self {
            commands,
            counters,
            handle: Some(handle),
        })
    }

    pub fn counters(&self) -> RunnerCounters {
        RunnerCounters {
            processed: self.counters.processed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn pause(&self) {
        self.send(RunnerCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(RunnerCommand::Resume);
    }

    /// Ask the thread to stop after the current frame.
    pub fn request_stop(&self) {
        self.send(RunnerCommand::Stop);
    }

    /// Apply settings on the processing thread and wait for the outcome.
    pub fn apply_settings(&self, plugin_index: usize, settings: SettingsUpdate) -> Result<()> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.commands
            .send(RunnerCommand::Apply {
                plugin_index,
                settings,
                reply,
            })
            .map_err(|_| runner_gone())?;
        response.recv().map_err(|_| runner_gone())?
    }

    pub fn close_settings(&self, plugin_index: usize) {
        self.send(RunnerCommand::Close { plugin_index });
    }

    /// Request a stop and wait for the thread.
    pub fn stop(mut self) -> Result<RunnerReport> {
        self.request_stop();
        self.join_inner()
    }

    /// Wait for the thread to finish on its own (frame limit, idle source or
    /// failure).
    pub fn join(mut self) -> Result<RunnerReport> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<RunnerReport> {
        let handle = self.handle.take().ok_or_else(runner_gone)?;
        handle
            .join()
            .map_err(|_| IspError::Other(anyhow::anyhow!("runner thread panicked")))
    }

    fn send(&self, command: RunnerCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("[runner] command dropped, thread already finished");
        }
    }
}

impl Drop for PipelineRunner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            if let Err(e) = self.join_inner() {
                tracing::warn!("[runner] {}", e);
            }
        }
    }
}

fn runner_gone() -> IspError {
    IspError::InvalidState("runner thread is not running".to_string())
}

/// Forwards settings events to the processing thread. The runner already
/// owns a started pipeline and paces frames itself, so capture init and
/// update requests are refused.
impl UiEventHandler for PipelineRunner {
    fn on_apply(&mut self, plugin_index: usize, settings: &SettingsUpdate) -> Result<()> {
        self.apply_settings(plugin_index, settings.clone())
    }

    fn on_close(&mut self, plugin_index: usize) -> Result<()> {
        self.close_settings(plugin_index);
        Ok(())
    }

    fn on_capture_init(&mut self) -> Result<()> {
        Err(IspError::InvalidState(
            "capture already running on the processing thread".to_string(),
        ))
    }

    fn on_capture_update(&mut self) -> Result<()> {
        Err(IspError::InvalidState(
            "frames are driven by the processing thread".to_string(),
        ))
    }

    fn on_capture_end(&mut self) -> Result<()> {
        self.request_stop();
        Ok(())
    }
}

fn run_loop(
    mut pipeline: IspPipeline,
    commands: Receiver<RunnerCommand>,
    options: RunnerOptions,
    counters: Arc<Counters>,
) -> RunnerReport {
    let mut paused = false;
    let mut consecutive_skips = 0u64;
    let mut error = None;

    let notify = |notice: UiNotice| {
        if let Some(sender) = &options.notices {
            sender.notify(notice);
        }
    };

    let reason = 'frames: loop {
        // Drain commands; block while paused.
        loop {
            let command = if paused {
                match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break 'frames StopReason::Requested,
                }
            } else {
                match commands.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'frames StopReason::Requested,
                }
            };

            match command {
                RunnerCommand::Pause if !paused => match pipeline.pause() {
                    Ok(()) => paused = true,
                    Err(e) => notify(UiNotice::from_error("pause", &e)),
                },
                RunnerCommand::Resume if paused => match pipeline.resume() {
                    Ok(()) => paused = false,
                    Err(e) => notify(UiNotice::from_error("resume", &e)),
                },
                RunnerCommand::Pause | RunnerCommand::Resume => {}
                RunnerCommand::Stop => break 'frames StopReason::Requested,
                RunnerCommand::Apply {
                    plugin_index,
                    settings,
                    reply,
                } => {
                    let _ = reply.send(pipeline.apply_settings(plugin_index, &settings));
                }
                RunnerCommand::Close { plugin_index } => {
                    if let Err(e) = pipeline.close_settings(plugin_index) {
                        notify(UiNotice::from_error("close settings", &e));
                    }
                }
            }
        }

        match pipeline.process_frame() {
            Ok(FrameOutcome::Processed) => {
                consecutive_skips = 0;
                let processed = counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
                if options.max_frames.is_some_and(|max| processed >= max) {
                    break StopReason::FrameLimit;
                }
            }
            Ok(FrameOutcome::Skipped(reason)) => {
                consecutive_skips += 1;
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                if consecutive_skips == 1 {
                    notify(UiNotice::info(format!("no new frame: {}", reason)));
                }
                if options
                    .max_consecutive_skips
                    .is_some_and(|max| consecutive_skips >= max)
                {
                    break StopReason::SourceIdle;
                }
            }
            Err(e) => {
                notify(UiNotice::from_error("processing", &e));
                error = Some(e);
                break StopReason::Failed;
            }
        }
    };

    if let Err(e) = pipeline.stop() {
        tracing::warn!("[runner] stop failed: {}", e);
    }
    let counters = RunnerCounters {
        processed: counters.processed.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
    };
    tracing::info!(
        "[runner] finished ({:?}): {} processed, {} skipped",
        reason,
        counters.processed,
        counters.skipped
    );
    RunnerReport {
        pipeline,
        counters,
        reason,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventQueue;
    use crate::core::lifecycle::ImageProcessingState;
    use crate::core::pipeline::ResolutionPolicy;
    use crate::core::processors::builtin::display::DisplayPlugin;
    use crate::core::processors::builtin::raw_file_source::RawFileSourcePlugin;
    use crate::core::processors::{CommonParams, PluginInstance};

    fn pipeline(dir: &std::path::Path, frames: usize, looping: bool) -> IspPipeline {
        let path = dir.join("in.raw");
        std::fs::write(&path, vec![7u8; frames * 4]).unwrap();

        let params = CommonParams {
            frame_rate: 500.0,
            settings_dir: dir.join("settings"),
        };
        let mut pipeline = IspPipeline::new(params, ResolutionPolicy::LookAhead);
        let mut source = PluginInstance::new("source", Box::new(RawFileSourcePlugin::new()));
        source
            .apply_settings(
                &SettingsUpdate::new()
                    .with("path", path.display())
                    .with("width", 2)
                    .with("height", 2)
                    .with("loop", looping),
            )
            .unwrap();
        pipeline.add_plugin(source).unwrap();
        pipeline
            .add_plugin(PluginInstance::new("display", Box::new(DisplayPlugin::new())))
            .unwrap();
        pipeline.init().unwrap();
        pipeline
    }

    #[test]
    fn test_stops_at_frame_limit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::spawn(
            pipeline(dir.path(), 1, true),
            RunnerOptions {
                max_frames: Some(5),
                ..Default::default()
            },
        )
        .unwrap();
        let report = runner.join().unwrap();
        assert_eq!(report.reason, StopReason::FrameLimit);
        assert_eq!(report.counters.processed, 5);
        assert_eq!(report.pipeline.state(), ImageProcessingState::Stop);
        assert!(report.pipeline.is_initialized());
    }

    #[test]
    fn test_idle_source_stops_runner_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let events = EventQueue::new();
        let runner = PipelineRunner::spawn(
            pipeline(dir.path(), 2, false),
            RunnerOptions {
                max_consecutive_skips: Some(3),
                notices: Some(events.sender()),
                ..Default::default()
            },
        )
        .unwrap();
        let report = runner.join().unwrap();
        assert_eq!(report.reason, StopReason::SourceIdle);
        assert_eq!(report.counters.processed, 2);
        assert_eq!(report.counters.skipped, 3);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_pause_blocks_and_allows_display_settings() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            PipelineRunner::spawn(pipeline(dir.path(), 1, true), RunnerOptions::default())
                .unwrap();

        // Running: display settings are locked.
        assert!(matches!(
            runner.apply_settings(1, SettingsUpdate::new().with("scale", 2)),
            Err(IspError::InvalidState(_))
        ));

        runner.pause();
        // Commands are handled in order, so the apply sees the paused state.
        runner
            .apply_settings(1, SettingsUpdate::new().with("scale", 2))
            .unwrap();
        assert!(runner
            .apply_settings(0, SettingsUpdate::new().with("width", 4))
            .is_err());

        let paused_at = runner.counters().processed;
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(runner.counters().processed, paused_at);

        runner.resume();
        let report = runner.stop().unwrap();
        assert_eq!(report.reason, StopReason::Requested);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_capture_events_reported_not_dropped() {
        use crate::core::events::{NoticeLevel, UiEvent};

        let dir = tempfile::tempdir().unwrap();
        let mut runner =
            PipelineRunner::spawn(pipeline(dir.path(), 1, true), RunnerOptions::default())
                .unwrap();

        let events = EventQueue::new();
        let sender = events.sender();
        sender.post(UiEvent::CaptureInit);
        sender.post(UiEvent::CaptureUpdate);
        sender.post(UiEvent::CaptureEnd);

        let report = events.drain(&mut runner);
        assert_eq!(report.handled, 3);
        assert_eq!(report.notices.len(), 2);
        assert!(report
            .notices
            .iter()
            .all(|notice| notice.level == NoticeLevel::Error));

        let report = runner.join().unwrap();
        assert_eq!(report.reason, StopReason::Requested);
    }

    #[test]
    fn test_spawn_requires_initialised_pipeline() {
        let pipeline = IspPipeline::new(CommonParams::default(), ResolutionPolicy::LookAhead);
        assert!(PipelineRunner::spawn(pipeline, RunnerOptions::default()).is_err());
    }
}
