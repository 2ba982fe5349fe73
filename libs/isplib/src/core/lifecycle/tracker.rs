// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Transition table for plugin lifecycles.
//!
//! ```text
//! Uninitialized --init--> Stopped <--> Running
//!                            ^  \        ^
//!                            |   v       |
//!                            +-- Paused -+
//! any --end--> Disposed --init--> Stopped
//! ```

use super::state::{ImageProcessingState, PluginLifecycleState};
use crate::core::error::{IspError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleTracker {
    state: PluginLifecycleState,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PluginLifecycleState {
        self.state
    }

    /// `init_process` may run: never initialised, or disposed since.
    pub fn ensure_can_init(&self) -> Result<()> {
        match self.state {
            PluginLifecycleState::Uninitialized | PluginLifecycleState::Disposed => Ok(()),
            other => Err(IspError::InvalidState(format!(
                "already initialised ({}); call end_process first",
                other
            ))),
        }
    }

    /// Record a successful `init_process`.
    pub fn mark_initialized(&mut self) -> Result<()> {
        self.ensure_can_init()?;
        self.state = PluginLifecycleState::Stopped;
        Ok(())
    }

    /// Move between Stop / Run / Pause. Same-state requests are no-ops.
    pub fn transition_to(&mut self, target: ImageProcessingState) -> Result<()> {
        if !self.state.is_initialized() {
            return Err(IspError::InvalidState(format!(
                "cannot enter {} from {}",
                target, self.state
            )));
        }
        self.state = PluginLifecycleState::from_processing_state(target);
        Ok(())
    }

    pub fn ensure_running(&self) -> Result<()> {
        if self.state == PluginLifecycleState::Running {
            Ok(())
        } else {
            Err(IspError::InvalidState(format!(
                "processing requires Running, plugin is {}",
                self.state
            )))
        }
    }

    /// Settings may be opened or applied whenever frames are not flowing, and
    /// while Paused for plugins whose settings surface allows it.
    pub fn ensure_settings_editable(&self, allowed_while_paused: bool) -> Result<()> {
        match self.state {
            PluginLifecycleState::Uninitialized
            | PluginLifecycleState::Stopped
            | PluginLifecycleState::Disposed => Ok(()),
            PluginLifecycleState::Paused if allowed_while_paused => Ok(()),
            other => Err(IspError::InvalidState(format!(
                "settings are locked while {}",
                other
            ))),
        }
    }

    /// Record `end_process`. Always succeeds.
    pub fn dispose(&mut self) {
        self.state = PluginLifecycleState::Disposed;
    }
}
