// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! UI event queue.
//!
//! Any thread may post; the owning thread drains with [`EventQueue::drain`],
//! which hands events to a [`UiEventHandler`] in posting order and turns
//! handler errors into [`UiNotice`]s.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::core::error::{ErrorScope, IspError, Result};
use crate::core::settings::SettingsUpdate;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Apply settings to the plugin at `plugin_index`.
    Apply {
        plugin_index: usize,
        settings: SettingsUpdate,
    },
    /// Close the settings surface of the plugin at `plugin_index`.
    Close { plugin_index: usize },
    CaptureInit,
    CaptureUpdate,
    CaptureEnd,
    /// Message for the user, typically posted by the processing thread.
    Notice(UiNotice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiNotice {
    pub level: NoticeLevel,
    pub message: String,
}

impl UiNotice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Frame-scoped and user-recoverable errors are warnings, the rest errors.
    pub fn from_error(context: &str, error: &IspError) -> Self {
        let level = match error.scope() {
            ErrorScope::Frame | ErrorScope::UserRecoverable => NoticeLevel::Warning,
            ErrorScope::Fatal => NoticeLevel::Error,
        };
        Self {
            level,
            message: format!("{}: {}", context, error),
        }
    }
}

impl fmt::Display for UiNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Receives drained events on the owning thread.
pub trait UiEventHandler {
    fn on_apply(&mut self, plugin_index: usize, settings: &SettingsUpdate) -> Result<()>;

    fn on_close(&mut self, plugin_index: usize) -> Result<()>;

    fn on_capture_init(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_capture_update(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_capture_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_notice(&mut self, _notice: &UiNotice) {}
}

/// Cloneable posting handle.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<UiEvent>,
}

impl EventSender {
    /// Returns false once the queue is gone.
    pub fn post(&self, event: UiEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn notify(&self, notice: UiNotice) -> bool {
        self.post(UiEvent::Notice(notice))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub handled: usize,
    /// Handler failures and posted notices, in order.
    pub notices: Vec<UiNotice>,
}

#[derive(Debug)]
pub struct EventQueue {
    sender: Sender<UiEvent>,
    receiver: Receiver<UiEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    pub fn post(&self, event: UiEvent) {
        // The queue owns a receiver, so sending cannot fail.
        let _ = self.sender.send(event);
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Dispatch every pending event without blocking.
    pub fn drain(&self, handler: &mut dyn UiEventHandler) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            report.handled += 1;
            if let Some(notice) = dispatch(handler, event) {
                handler.on_notice(&notice);
                report.notices.push(notice);
            }
        }
        report
    }
}

fn dispatch(handler: &mut dyn UiEventHandler, event: UiEvent) -> Option<UiNotice> {
    let (context, result) = match event {
        UiEvent::Apply {
            plugin_index,
            settings,
        } => (
            format!("apply settings to plugin {}", plugin_index),
            handler.on_apply(plugin_index, &settings),
        ),
        UiEvent::Close { plugin_index } => (
            format!("close settings of plugin {}", plugin_index),
            handler.on_close(plugin_index),
        ),
        UiEvent::CaptureInit => ("capture init".to_string(), handler.on_capture_init()),
        UiEvent::CaptureUpdate => ("capture update".to_string(), handler.on_capture_update()),
        UiEvent::CaptureEnd => ("capture end".to_string(), handler.on_capture_end()),
        UiEvent::Notice(notice) => return Some(notice),
    };

    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("[events] {} failed: {}", context, e);
            Some(UiNotice::from_error(&context, &e))
        }
    }
}
