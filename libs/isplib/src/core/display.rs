// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Presentation state shared between a display plugin and the thread that
//! shows its frames.
//!
//! The plugin enqueues on the processing thread. The display thread calls
//! [`DisplayContext::present`] once per tick and forwards pointer input to
//! [`DisplayContext::handle_mouse`], which updates the pixel inspector and
//! then runs the registered callbacks with the context itself.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::core::frames::{FrameBuffer, FrameQueue};
use crate::core::pixel_format::PixelFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseEventKind {
    Move,
    LeftDown,
    LeftUp,
    Leave,
}

/// Pointer input in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: i64,
    pub y: i64,
}

impl MouseEvent {
    pub fn new(kind: MouseEventKind, x: i64, y: i64) -> Self {
        Self { kind, x, y }
    }
}

/// Sample values under the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelReading {
    pub x: u32,
    pub y: u32,
    pub format: PixelFormat,
    pub values: Vec<u16>,
}

impl fmt::Display for PixelReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {} {:?}", self.x, self.y, self.format, self.values)
    }
}

pub type MouseCallback = Box<dyn Fn(&DisplayContext, &MouseEvent) + Send + Sync>;

pub struct DisplayContext {
    queue: Arc<FrameQueue>,
    presented: Mutex<Arc<FrameBuffer>>,
    reading: Mutex<Option<PixelReading>>,
    inspector_enabled: Mutex<bool>,
    callbacks: RwLock<Vec<MouseCallback>>,
}

impl Default for DisplayContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayContext {
    pub fn new() -> Self {
        Self::with_queue(Arc::new(FrameQueue::new()))
    }

    pub fn with_queue(queue: Arc<FrameQueue>) -> Self {
        Self {
            queue,
            presented: Mutex::new(Arc::new(FrameBuffer::empty(PixelFormat::Gray8))),
            reading: Mutex::new(None),
            inspector_enabled: Mutex::new(true),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// Take the newest frame, if one arrived since the last call.
    pub fn present(&self) -> Option<Arc<FrameBuffer>> {
        let frame = self.queue.dequeue_fresh()?;
        *self.presented.lock() = Arc::clone(&frame);
        Some(frame)
    }

    /// The frame most recently returned by [`present`](Self::present).
    pub fn current_frame(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.presented.lock())
    }

    /// Callbacks must not register further callbacks.
    pub fn register_mouse_callback<F>(&self, callback: F)
    where
        F: Fn(&DisplayContext, &MouseEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Box::new(callback));
    }

    pub fn set_inspector_enabled(&self, enabled: bool) {
        *self.inspector_enabled.lock() = enabled;
        if !enabled {
            *self.reading.lock() = None;
        }
    }

    pub fn inspector_enabled(&self) -> bool {
        *self.inspector_enabled.lock()
    }

    pub fn handle_mouse(&self, event: &MouseEvent) {
        if self.inspector_enabled() {
            let reading = match event.kind {
                MouseEventKind::Leave => None,
                _ => self.inspect(event.x, event.y),
            };
            *self.reading.lock() = reading;
        }
        for callback in self.callbacks.read().iter() {
            callback(self, event);
        }
    }

    /// Read the presented frame at image coordinates.
    pub fn inspect(&self, x: i64, y: i64) -> Option<PixelReading> {
        let frame = self.current_frame();
        let (x, y) = (u32::try_from(x).ok()?, u32::try_from(y).ok()?);
        if x >= frame.width() || y >= frame.height() {
            return None;
        }
        let values = (0..frame.format().channels())
            .map(|channel| frame.sample(x, y, channel))
            .collect();
        Some(PixelReading {
            x,
            y,
            format: frame.format(),
            values,
        })
    }

    /// Last reading taken by the pointer, if it is over the image.
    pub fn pixel_reading(&self) -> Option<PixelReading> {
        self.reading.lock().clone()
    }

    pub fn close(&self) {
        self.queue.close();
    }
}

impl fmt::Debug for DisplayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayContext")
            .field("stats", &self.queue.stats())
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}
