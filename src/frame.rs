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

//! Frame construction.
//!
//! Two shapes go on the wire:
//!
//! ```plain
//! supervisory:  FLAG | A | C | BCC1 | FLAG
//! information:  FLAG | A | C | BCC1 | stuff(payload || BCC2) | FLAG
//! ```
//!
//! `BCC1 = A ^ C` and `BCC2` is the XOR of every payload byte. Parsing lives
//! in [`crate::receiver`].

use std::ops::Deref;
use crate::error::FrameError;
use crate::protocol::*;

// ============================================================================
// Sequence Numbers
// ============================================================================

/// One-bit sequence number carried by information, RR and REJ frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Seq {
    #[default]
    Zero,
    One,
}

impl Seq {
    pub fn toggled(self) -> Seq {
        match self {
            Seq::Zero => Seq::One,
            Seq::One => Seq::Zero,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Seq::Zero => 0,
            Seq::One => 1,
        }
    }
}

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bit())
    }
}

// ============================================================================
// Frame Kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Set,
    UnnumberedAck,
    Disconnect,
    ReceiveReady(Seq),
    Reject(Seq),
    Information(Seq, Vec<u8>),
}

impl FrameKind {
    /// Control byte identifying this kind on the wire.
    pub fn control(&self) -> u8 {
        match self {
            FrameKind::Set => C_SET,
            FrameKind::UnnumberedAck => C_UA,
            FrameKind::Disconnect => C_DISC,
            FrameKind::ReceiveReady(Seq::Zero) => C_RR0,
            FrameKind::ReceiveReady(Seq::One) => C_RR1,
            FrameKind::Reject(Seq::Zero) => C_REJ0,
            FrameKind::Reject(Seq::One) => C_REJ1,
            FrameKind::Information(seq, _) => information_control(*seq),
        }
    }

    /// Supervisory kind for a control byte, `None` for information or unknown controls.
    pub fn supervisory(control: u8) -> Option<FrameKind> {
        match control {
            C_SET => Some(FrameKind::Set),
            C_UA => Some(FrameKind::UnnumberedAck),
            C_DISC => Some(FrameKind::Disconnect),
            C_RR0 => Some(FrameKind::ReceiveReady(Seq::Zero)),
            C_RR1 => Some(FrameKind::ReceiveReady(Seq::One)),
            C_REJ0 => Some(FrameKind::Reject(Seq::Zero)),
            C_REJ1 => Some(FrameKind::Reject(Seq::One)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Set => "SET",
            FrameKind::UnnumberedAck => "UA",
            FrameKind::Disconnect => "DISC",
            FrameKind::ReceiveReady(_) => "RR",
            FrameKind::Reject(_) => "REJ",
            FrameKind::Information(_, _) => "I",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::ReceiveReady(seq) | FrameKind::Reject(seq) => write!(f, "{}{}", self.name(), seq),
            FrameKind::Information(seq, payload) => {
                write!(f, "{}{} ({} bytes)", self.name(), seq, payload.len())
            }
            _ => f.write_str(self.name()),
        }
    }
}

pub fn information_control(seq: Seq) -> u8 {
    match seq {
        Seq::Zero => C_I0,
        Seq::One => C_I1,
    }
}

pub fn information_seq(control: u8) -> Option<Seq> {
    match control {
        C_I0 => Some(Seq::Zero),
        C_I1 => Some(Seq::One),
        _ => None,
    }
}

// ============================================================================
// Raw Frames
// ============================================================================

/// Wire bytes of exactly one frame, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for RawFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// Encoding
// ============================================================================

pub fn checksum1(address: u8, control: u8) -> u8 {
    address ^ control
}

pub fn checksum2(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

pub fn encode_supervisory(address: u8, control: u8) -> RawFrame {
    RawFrame(vec![FLAG, address, control, checksum1(address, control), FLAG])
}

pub fn encode_information(
    address: u8,
    seq: Seq,
    payload: &[u8],
    max_payload: usize,
) -> Result<RawFrame, FrameError> {
    if payload.len() > max_payload {
        return Err(FrameError::PayloadTooLarge { len: payload.len(), max: max_payload });
    }

    let control = information_control(seq);

    // Worst case every byte, BCC2 included, needs escaping
    let mut frame = Vec::with_capacity(SU_FRAME_SIZE + 2 * (payload.len() + 1));
    frame.extend_from_slice(&[FLAG, address, control, checksum1(address, control)]);
    stuff_into(payload, &mut frame);
    stuff_into(&[checksum2(payload)], &mut frame);
    frame.push(FLAG);

    Ok(RawFrame(frame))
}

fn stuff_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &byte in bytes {
        if byte == FLAG || byte == ESC {
            out.push(ESC);
            out.push(byte ^ ESC_MASK);
        } else {
            out.push(byte);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
