// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// TimerGate Trait
// ============================================================================

/// One-shot expiry polled by the engine between byte reads.
pub trait TimerGate: Send {
    fn arm(&mut self, duration: Duration);

    /// True once the armed duration has elapsed, until re-armed or disarmed.
    fn expired(&mut self) -> bool;

    fn disarm(&mut self);
}

// ============================================================================
// Deadline Alarm
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlarmState {
    Idle,
    Armed(Instant),
    Fired,
}

/// Wall-clock timer gate backed by an `Instant` deadline.
#[derive(Debug)]
pub struct Alarm {
    state: AlarmState,
    /// Firings since creation, numbers the log line
    count: u32,
}

impl Alarm {
    pub fn new() -> Self {
        Alarm { state: AlarmState::Idle, count: 0 }
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerGate for Alarm {
    fn arm(&mut self, duration: Duration) {
        // A deadline past what Instant can represent never comes
        self.state = match Instant::now().checked_add(duration) {
            Some(deadline) => AlarmState::Armed(deadline),
            None => AlarmState::Idle,
        };
    }

    fn expired(&mut self) -> bool {
        match self.state {
            AlarmState::Armed(deadline) if Instant::now() >= deadline => {
                self.state = AlarmState::Fired;
                self.count += 1;
                debug!("Alarm #{} fired", self.count);
                true
            }
            AlarmState::Fired => true,
            _ => false,
        }
    }

    fn disarm(&mut self) {
        self.state = AlarmState::Idle;
    }
}

// ============================================================================
// Tests
// ============================================================================
