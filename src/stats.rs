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

/// Per-connection protocol counters.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub frames_sent: u32,
    pub frames_received: u32,
    pub retransmissions: u32,
    pub timeouts: u32,
    pub rej_sent: u32,
    pub rej_received: u32,
    pub duplicates: u32,
    pub header_errors: u32,
    pub payload_errors: u32,
    pub overflows: u32,
    /// Payload bytes delivered in either direction
    pub data_bytes: u64,
    started: Instant,
    finished: Option<Instant>,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics {
            frames_sent: 0,
            frames_received: 0,
            retransmissions: 0,
            timeouts: 0,
            rej_sent: 0,
            rej_received: 0,
            duplicates: 0,
            header_errors: 0,
            payload_errors: 0,
            overflows: 0,
            data_bytes: 0,
            started: Instant::now(),
            finished: None,
        }
    }

    /// Freeze the elapsed time, called when the connection closes.
    pub fn finish(&mut self) {
        self.finished.get_or_insert_with(Instant::now);
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(Instant::now) - self.started
    }

    /// Delivered payload rate in bits per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.data_bytes as f64 * 8.0 / secs
    }

    fn percent(part: u32, whole: u32) -> Option<f64> {
        (whole > 0).then(|| part as f64 * 100.0 / whole as f64)
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Data transfer:")?;
        writeln!(f, "  Payload bytes:       {}", self.data_bytes)?;
        writeln!(f, "  Transfer time:       {:.2} s", self.elapsed().as_secs_f64())?;
        writeln!(f, "  Throughput:          {:.2} bit/s", self.throughput())?;
        writeln!(f, "Frames:")?;
        writeln!(f, "  Sent:                {}", self.frames_sent)?;
        writeln!(f, "  Received:            {}", self.frames_received)?;
        writeln!(f, "  Retransmitted:       {}", self.retransmissions)?;
        if let Some(rate) = Self::percent(self.retransmissions, self.frames_sent) {
            writeln!(f, "  Retransmission rate: {:.2}%", rate)?;
        }
        writeln!(f, "Errors:")?;
        writeln!(f, "  Timeouts:            {}", self.timeouts)?;
        writeln!(f, "  REJ sent/received:   {}/{}", self.rej_sent, self.rej_received)?;
        writeln!(f, "  Duplicates:          {}", self.duplicates)?;
        writeln!(f, "  BCC1 errors:         {}", self.header_errors)?;
        writeln!(f, "  BCC2 errors:         {}", self.payload_errors)?;
        write!(f, "  Oversized frames:    {}", self.overflows)
    }
}
