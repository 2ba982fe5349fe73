// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod frame_buffer;
mod frame_queue;

pub use frame_buffer::{FrameBuffer, read_sample, write_sample};
pub use frame_queue::{FrameQueue, FrameQueueStats};
