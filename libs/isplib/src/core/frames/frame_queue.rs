// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Triple-buffer handoff between the processing thread and a display thread.
//!
//! Three slots rotate through the roles `Enqueue`, `Swap` and `Deque`. The
//! producer copies into the `Enqueue` slot and swaps it with `Swap`; the
//! consumer swaps `Swap` with `Deque` when something new arrived. Neither side
//! ever waits on the other beyond the short critical section, and frames the
//! consumer never saw are simply overwritten.

use std::sync::Arc;

use parking_lot::Mutex;

use super::FrameBuffer;
use crate::core::pixel_format::PixelFormat;

/// Counters for queue traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameQueueStats {
    /// Frames accepted by `enqueue`.
    pub enqueued: u64,
    /// Fresh frames handed to the consumer.
    pub dequeued: u64,
    /// Frames superseded before the consumer picked them up.
    pub dropped: u64,
}

struct QueueSlots {
    slots: [Arc<FrameBuffer>; 3],
    enqueue: usize,
    swap: usize,
    deque: usize,
    /// `Swap` holds a frame the consumer has not seen yet.
    fresh: bool,
    closed: bool,
    stats: FrameQueueStats,
}

impl QueueSlots {
    fn empty_slots() -> [Arc<FrameBuffer>; 3] {
        std::array::from_fn(|_| Arc::new(FrameBuffer::empty(PixelFormat::Gray8)))
    }
}

/// Newest-frame-wins queue with three fixed slots.
///
/// Dequeued frames are shared read-only handles. If the producer rotates back
/// onto a slot the consumer is still holding, it writes into a fresh
/// allocation instead, so a frame in the consumer's hands never changes.
pub struct FrameQueue {
    inner: Mutex<QueueSlots>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueSlots {
                slots: QueueSlots::empty_slots(),
                enqueue: 0,
                swap: 1,
                deque: 2,
                fresh: false,
                closed: false,
                stats: FrameQueueStats::default(),
            }),
        }
    }

    /// Deep-copy `frame` into the queue and publish it as the newest frame.
    ///
    /// The `Enqueue` slot is reallocated when the frame's size or format
    /// differs from it. Returns `false` once the queue has been closed.
    pub fn enqueue(&self, frame: &FrameBuffer) -> bool {
        let mut guard = self.inner.lock();
        let queue = &mut *guard;
        if queue.closed {
            return false;
        }

        let slot = &mut queue.slots[queue.enqueue];
        match Arc::get_mut(slot).filter(|buffer| buffer.same_layout(frame)) {
            Some(buffer) => buffer.data_mut().copy_from_slice(frame.data()),
            // Layout changed, or the consumer still holds this buffer.
            None => *slot = Arc::new(frame.clone()),
        }

        std::mem::swap(&mut queue.enqueue, &mut queue.swap);
        if queue.fresh {
            queue.stats.dropped += 1;
        }
        queue.fresh = true;
        queue.stats.enqueued += 1;
        true
    }

    /// Return the newest completed frame.
    ///
    /// When nothing new arrived since the previous call the same frame is
    /// returned again. A zero-size frame means nothing was ever enqueued.
    pub fn dequeue(&self) -> Arc<FrameBuffer> {
        let mut guard = self.inner.lock();
        let queue = &mut *guard;
        Self::take_fresh(queue);
        Arc::clone(&queue.slots[queue.deque])
    }

    /// Like [`dequeue`](Self::dequeue) but `None` when no new frame arrived.
    pub fn dequeue_fresh(&self) -> Option<Arc<FrameBuffer>> {
        let mut guard = self.inner.lock();
        let queue = &mut *guard;
        if Self::take_fresh(queue) {
            Some(Arc::clone(&queue.slots[queue.deque]))
        } else {
            None
        }
    }

    fn take_fresh(queue: &mut QueueSlots) -> bool {
        if !queue.fresh {
            return false;
        }
        std::mem::swap(&mut queue.swap, &mut queue.deque);
        queue.fresh = false;
        queue.stats.dequeued += 1;
        true
    }

    /// True when a frame is waiting that the consumer has not seen.
    pub fn has_fresh(&self) -> bool {
        self.inner.lock().fresh
    }

    /// Release all slots; later `enqueue` calls return `false`.
    pub fn close(&self) {
        let mut queue = self.inner.lock();
        queue.slots = QueueSlots::empty_slots();
        queue.fresh = false;
        queue.closed = true;
        tracing::debug!("Frame queue closed after {} frames", queue.stats.enqueued);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn stats(&self) -> FrameQueueStats {
        self.inner.lock().stats
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
