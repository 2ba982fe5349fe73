// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! `isp run`: drive a configured pipeline until it stops.
//!
//! The pipeline runs on the runner's processing thread. This thread plays
//! the display role: it presents fresh frames from every display plugin and
//! drains the event queue the runner posts notices to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use isplib::core::events::NoticeLevel;
use isplib::core::pipeline::StopReason;
use isplib::{
    EventQueue, IspPipeline, PipelineConfig, PipelineRunner, PluginRegistry, RunnerOptions,
    UiNotice,
};

#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    /// Stop after this many processed frames.
    pub frames: Option<u64>,
    /// Stop after this many consecutive frames without input.
    pub idle_frames: Option<u64>,
    /// Skip writing settings files on exit.
    pub no_save: bool,
}

pub fn run(config: &PipelineConfig, registry: &PluginRegistry, args: &RunArgs) -> Result<()> {
    let mut pipeline =
        IspPipeline::from_config(config, registry).context("Failed to build pipeline")?;
    let loaded = pipeline
        .load_settings()
        .context("Failed to load saved settings")?;
    tracing::info!("[run] restored settings for {} plugin(s)", loaded);

    pipeline.init().context("Pipeline initialisation failed")?;
    let displays = pipeline.display_contexts();

    let stop_requested = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || {
        tracing::info!("Ctrl+C received, stopping pipeline");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let events = EventQueue::new();
    let mut runner = PipelineRunner::spawn(
        pipeline,
        RunnerOptions {
            max_frames: args.frames,
            max_consecutive_skips: args.idle_frames,
            notices: Some(events.sender()),
        },
    )
    .context("Failed to start processing thread")?;

    let tick = tick_interval(config.frame_rate);
    let mut presented = 0u64;
    let mut stop_sent = false;
    while !runner.is_finished() {
        if stop_requested.load(Ordering::SeqCst) && !stop_sent {
            runner.request_stop();
            stop_sent = true;
        }

        for display in &displays {
            if let Some(frame) = display.present() {
                presented += 1;
                tracing::trace!(
                    "[run] presented {}x{} {}",
                    frame.width(),
                    frame.height(),
                    frame.format()
                );
            }
        }

        log_notices(events.drain(&mut runner).notices);

        std::thread::sleep(tick);
    }

    let mut report = runner.join()?;
    log_notices(events.drain(&mut report.pipeline).notices);

    if !args.no_save {
        let written = report
            .pipeline
            .save_settings()
            .context("Failed to save settings")?;
        tracing::info!("[run] saved {} settings file(s)", written.len());
    }
    report.pipeline.end();
    for display in &displays {
        display.close();
    }

    println!(
        "Stopped ({}): {} frame(s) processed, {} skipped, {} presented",
        describe(report.reason),
        report.counters.processed,
        report.counters.skipped,
        presented
    );

    match report.error {
        Some(e) => Err(e).context("Pipeline failed"),
        None => Ok(()),
    }
}

fn log_notices(notices: Vec<UiNotice>) {
    for notice in notices {
        match notice.level {
            NoticeLevel::Info => tracing::info!("[run] {}", notice.message),
            NoticeLevel::Warning => tracing::warn!("[run] {}", notice.message),
            NoticeLevel::Error => tracing::error!("[run] {}", notice.message),
        }
    }
}

/// Poll at twice the frame rate, capped to [1ms, 50ms].
fn tick_interval(frame_rate: f64) -> Duration {
    let seconds = if frame_rate.is_finite() && frame_rate > 0.0 {
        0.5 / frame_rate
    } else {
        0.05
    };
    Duration::from_secs_f64(seconds.clamp(0.001, 0.05))
}

fn describe(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Requested => "requested",
        StopReason::FrameLimit => "frame limit reached",
        StopReason::SourceIdle => "source idle",
        StopReason::Failed => "failed",
    }
}
