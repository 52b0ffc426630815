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

//! Byte-at-a-time frame recognition.
//!
//! [`FrameReceiver`] is fed one byte per call and reports an [`Outcome`] once
//! a whole frame matching the caller's [`Expectation`] has gone by. Bytes
//! before the first delimiter, frames from the wrong address and frames with
//! unexpected control bytes are skipped. A delimiter always restarts frame
//! acquisition, so a frame whose closing flag was lost does not swallow the
//! next one.

use crate::frame::{checksum1, checksum2, information_seq, FrameKind, Seq};
use crate::protocol::*;

// ============================================================================
// Expectations & Outcomes
// ============================================================================

/// Which frames the caller is waiting for.
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'a> {
    /// Address of the originating peer
    pub address: u8,
    /// Accepted supervisory control bytes
    pub controls: &'a [u8],
    /// Accept information frames of either sequence number
    pub information: bool,
}

impl<'a> Expectation<'a> {
    pub fn supervisory(address: u8, controls: &'a [u8]) -> Self {
        Expectation { address, controls, information: false }
    }

    pub fn information(address: u8) -> Self {
        Expectation { address, controls: &[], information: true }
    }

    pub fn or_supervisory(self, controls: &'a [u8]) -> Self {
        Expectation { controls, ..self }
    }

    fn accepts(&self, control: u8) -> bool {
        self.controls.contains(&control)
            || (self.information && information_seq(control).is_some())
    }
}

/// Which checksum failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// Header check (`A ^ C`)
    Header,
    /// Payload check on an information frame carrying this sequence number
    Payload(Seq),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Frame(FrameKind),
    ChecksumMismatch(Checksum),
    /// More destuffed bytes than the payload limit allows
    FrameTooLarge,
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitDelimiter,
    DelimiterSeen,
    AddressSeen,
    ControlSeen,
    Checksum1Ok,
}

// ============================================================================
// Receiver
// ============================================================================

pub struct FrameReceiver {
    state: State,
    address: u8,
    control: u8,
    buffer: Vec<u8>,
    escaped: bool,
    max_payload: usize,
}

impl FrameReceiver {
    pub fn new(max_payload: usize) -> Self {
        FrameReceiver {
            state: State::AwaitDelimiter,
            address: 0,
            control: 0,
            buffer: Vec::new(),
            escaped: false,
            max_payload,
        }
    }

    /// Forget any partially received frame.
    pub fn reset(&mut self) {
        self.state = State::AwaitDelimiter;
        self.buffer.clear();
        self.escaped = false;
    }

    fn restart(&mut self) {
        self.reset();
        self.state = State::DelimiterSeen;
    }

    /// Consume one byte. Returns `Some` when a frame attempt has been decided.
    pub fn feed(&mut self, byte: u8, expect: &Expectation) -> Option<Outcome> {
        match self.state {
            State::AwaitDelimiter => {
                if byte == FLAG {
                    self.state = State::DelimiterSeen;
                }
                None
            }
            State::DelimiterSeen => {
                if byte == FLAG {
                    // Back-to-back delimiters, stay put
                } else if byte == expect.address {
                    self.address = byte;
                    self.state = State::AddressSeen;
                } else {
                    self.reset();
                }
                None
            }
            State::AddressSeen => {
                if byte == FLAG {
                    self.restart();
                } else if expect.accepts(byte) {
                    self.control = byte;
                    self.state = State::ControlSeen;
                } else {
                    self.reset();
                }
                None
            }
            State::ControlSeen => {
                if byte == FLAG {
                    self.restart();
                    None
                } else if byte == checksum1(self.address, self.control) {
                    self.state = State::Checksum1Ok;
                    None
                } else {
                    self.reset();
                    Some(Outcome::ChecksumMismatch(Checksum::Header))
                }
            }
            State::Checksum1Ok => match information_seq(self.control) {
                Some(seq) => self.feed_information(byte, seq),
                None => self.feed_supervisory_end(byte),
            },
        }
    }

    fn feed_supervisory_end(&mut self, byte: u8) -> Option<Outcome> {
        if byte != FLAG {
            self.reset();
            return None;
        }

        let kind = FrameKind::supervisory(self.control);
        self.reset();
        kind.map(Outcome::Frame)
    }

    fn feed_information(&mut self, byte: u8, seq: Seq) -> Option<Outcome> {
        if byte == FLAG {
            if self.escaped || self.buffer.is_empty() {
                // Malformed tail, treat the flag as the start of a new frame
                self.restart();
                return None;
            }
            return Some(self.finish_information(seq));
        }

        let value = if self.escaped {
            self.escaped = false;
            byte ^ ESC_MASK
        } else if byte == ESC {
            self.escaped = true;
            return None;
        } else {
            byte
        };

        // Payload plus the trailing BCC2
        if self.buffer.len() > self.max_payload {
            self.reset();
            return Some(Outcome::FrameTooLarge);
        }
        self.buffer.push(value);
        None
    }

    fn finish_information(&mut self, seq: Seq) -> Outcome {
        let mut payload = std::mem::take(&mut self.buffer);
        let received = payload.pop().unwrap_or_default();
        self.reset();

        if checksum2(&payload) == received {
            Outcome::Frame(FrameKind::Information(seq, payload))
        } else {
            Outcome::ChecksumMismatch(Checksum::Payload(seq))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
