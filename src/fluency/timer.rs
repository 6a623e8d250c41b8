//! Per-item response countdown and zone classification.
//!
//! Time is passed in explicitly as `Instant`s so the caller owns the clock;
//! the session feeds `Instant::now()` in production and fixed offsets in tests.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::config::TimingConfig;
use super::stage::PracticeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Yellow,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerWindow {
    pub duration: Duration,
    /// Elapsed time below this is green. Equal to `duration` for windows
    /// without a yellow zone.
    pub green_until: Duration,
}

impl TimerWindow {
    pub fn new(duration: Duration, green_until: Duration) -> Self {
        Self {
            duration,
            green_until: green_until.min(duration),
        }
    }

    /// Window for an item given its practice mode and current session score.
    pub fn for_item(mode: PracticeMode, score: i32, timing: &TimingConfig) -> Self {
        match mode {
            PracticeMode::Accuracy => Self::new(timing.accuracy_window, timing.accuracy_window),
            PracticeMode::Timed => {
                let duration = match score {
                    s if s <= 0 => timing.slow_window,
                    1 => timing.medium_window,
                    _ => timing.fast_window,
                };
                Self::new(duration, duration.mul_f64(timing.green_ratio))
            }
        }
    }

    pub fn has_yellow_zone(&self) -> bool {
        self.green_until < self.duration
    }

    pub fn zone_at(&self, elapsed: Duration) -> Zone {
        if elapsed >= self.duration {
            Zone::Expired
        } else if elapsed < self.green_until {
            Zone::Green
        } else {
            Zone::Yellow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ResponseTimer {
    window: TimerWindow,
    started_at: Instant,
    state: TimerState,
}

impl ResponseTimer {
    pub fn start(window: TimerWindow, now: Instant) -> Self {
        Self {
            window,
            started_at: now,
            state: TimerState::Running,
        }
    }

    pub fn window(&self) -> TimerWindow {
        self.window
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Zone at `now` without changing state.
    pub fn classify(&self, now: Instant) -> Zone {
        if self.state == TimerState::Expired {
            return Zone::Expired;
        }
        self.window.zone_at(self.elapsed(now))
    }

    /// Reports the zone and latches `Expired` once the window has run out.
    pub fn tick(&mut self, now: Instant) -> Zone {
        let zone = self.classify(now);
        if zone == Zone::Expired && self.state == TimerState::Running {
            self.state = TimerState::Expired;
        }
        zone
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        if self.state == TimerState::Expired {
            return Duration::ZERO;
        }
        self.window.duration.saturating_sub(self.elapsed(now))
    }

    pub fn cancel(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Cancelled;
        }
    }
}
