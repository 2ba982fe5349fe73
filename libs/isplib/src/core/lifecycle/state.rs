// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// Processing state shared by the pipeline and every plugin's settings surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageProcessingState {
    Stop,
    Run,
    Pause,
}

impl std::fmt::Display for ImageProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "Stop"),
            Self::Run => write!(f, "Run"),
            Self::Pause => write!(f, "Pause"),
        }
    }
}

/// Lifecycle state of a plugin instance
///
/// `Uninitialized` precedes the first successful `init_process`. `Disposed`
/// follows `end_process` and may be initialised again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginLifecycleState {
    /// Constructed, not yet initialised
    Uninitialized,
    /// Initialised, not processing; settings may change
    Stopped,
    /// Processing frames; settings are locked
    Running,
    /// Processing suspended, resources still held
    Paused,
    /// Resources released by `end_process`
    Disposed,
}

impl Default for PluginLifecycleState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl PluginLifecycleState {
    /// The externally visible processing state, if initialised.
    pub fn processing_state(&self) -> Option<ImageProcessingState> {
        match self {
            Self::Stopped => Some(ImageProcessingState::Stop),
            Self::Running => Some(ImageProcessingState::Run),
            Self::Paused => Some(ImageProcessingState::Pause),
            Self::Uninitialized | Self::Disposed => None,
        }
    }

    pub fn from_processing_state(state: ImageProcessingState) -> Self {
        match state {
            ImageProcessingState::Stop => Self::Stopped,
            ImageProcessingState::Run => Self::Running,
            ImageProcessingState::Pause => Self::Paused,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.processing_state().is_some()
    }
}

impl std::fmt::Display for PluginLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Disposed => write!(f, "Disposed"),
        }
    }
}
