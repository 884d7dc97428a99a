use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    Idle,
    Running,
    Expired,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    Running(u32),
    Expired,
    Inactive,
}

/// Countdown for one attempt: `idle -> running -> expired`, or
/// `running -> stopped` when submission happens first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClock {
    state: ClockState,
    duration_seconds: u32,
    remaining_seconds: u32,
    started_at: Option<DateTime<Utc>>,
}

impl SessionClock {
    pub fn new(duration_seconds: u32) -> Self {
        Self {
            state: ClockState::Idle,
            duration_seconds,
            remaining_seconds: duration_seconds,
            started_at: None,
        }
    }

    /// Returns false when the clock was already started.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != ClockState::Idle {
            return false;
        }
        self.state = ClockState::Running;
        self.started_at = Some(now);
        self.remaining_seconds = self.duration_seconds;
        if self.remaining_seconds == 0 {
            self.state = ClockState::Expired;
        }
        true
    }

    /// Starts an idle clock from previously saved progress.
    pub fn restore(&mut self, started_at: DateTime<Utc>, remaining_seconds: u32) -> bool {
        if self.state != ClockState::Idle {
            return false;
        }
        self.started_at = Some(started_at);
        self.remaining_seconds = remaining_seconds.min(self.duration_seconds);
        self.state = if self.remaining_seconds == 0 {
            ClockState::Expired
        } else {
            ClockState::Running
        };
        true
    }

    pub fn tick(&mut self) -> ClockTick {
        if self.state != ClockState::Running {
            return ClockTick::Inactive;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.state = ClockState::Expired;
            ClockTick::Expired
        } else {
            ClockTick::Running(self.remaining_seconds)
        }
    }

    pub fn stop(&mut self) {
        if matches!(self.state, ClockState::Idle | ClockState::Running) {
            self.state = ClockState::Stopped;
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.duration_seconds - self.remaining_seconds
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
}
