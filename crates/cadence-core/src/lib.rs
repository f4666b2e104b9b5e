// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::time::{Duration, Instant};

/// Installs the fmt subscriber, filtered by `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let installed = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("tracing subscriber installed");
    }
}

/// Counts frames and reports a rate once per `window`.
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        FpsCounter {
            window,
            frames: 0,
            since: Instant::now(),
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    /// Counts one frame at `now`; returns frames per second once the window has elapsed.
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.since);
        if elapsed < self.window {
            return None;
        }
        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.since = now;
        Some(fps)
    }

    /// Starts a fresh window; used after a pause so idle time is not averaged in.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.frames = 0;
        self.since = now;
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
