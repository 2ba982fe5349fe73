// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod isp_pipeline;
mod resolver;
mod runner;

pub use isp_pipeline::{FrameOutcome, IspPipeline};
pub use resolver::{ChainStage, ResolutionPolicy, resolve_port_chain};
pub use runner::{PipelineRunner, RunnerCounters, RunnerOptions, RunnerReport, StopReason};
