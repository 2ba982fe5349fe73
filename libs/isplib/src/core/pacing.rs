// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::{Duration, Instant};

use crate::core::error::{IspError, Result};

/// Throttles a producer to a declared frame rate.
///
/// `wait` sleeps for whatever remains of the current frame interval. A
/// producer that is already late does not sleep and the schedule restarts
/// from now; there is no catch-up burst and no backpressure.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Non-positive or non-finite rates disable pacing. A rate so low that
    /// its interval overflows `Duration` is a configuration error.
    pub fn from_fps(fps: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Ok(Self::new(Duration::ZERO));
        }
        let interval = Duration::try_from_secs_f64(1.0 / fps).map_err(|e| {
            IspError::Configuration(format!("frame_rate {} is out of range: {}", fps, e))
        })?;
        Ok(Self::new(interval))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next frame is due. The first call returns immediately.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            let due = last + self.interval;
            if due > now {
                std::thread::sleep(due - now);
                self.last_tick = Some(due);
                return;
            }
        }
        self.last_tick = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_tick = None;
    }
}
