// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod state;
mod tracker;

pub use state::{ImageProcessingState, PluginLifecycleState};
pub use tracker::LifecycleTracker;
