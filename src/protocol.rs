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

//! Link protocol wire constants

/// Frame delimiter - opens and closes every frame
pub const FLAG: u8 = 0x7E;

/// Escape - the following byte was XORed with `ESC_MASK`
pub const ESC: u8 = 0x7D;

/// Applied to an escaped byte on both sides of the link
pub const ESC_MASK: u8 = 0x20;

/// Address of frames originated by the initiator
pub const A_TX: u8 = 0x03;

/// Address of frames originated by the responder
pub const A_RX: u8 = 0x01;

/// Set - initiator requests a connection
pub const C_SET: u8 = 0x03;

/// Unnumbered acknowledgment - confirms SET or DISC
pub const C_UA: u8 = 0x07;

/// Disconnect - either side tears the connection down
pub const C_DISC: u8 = 0x0B;

/// Receiver ready, next expected information frame is 0
pub const C_RR0: u8 = 0x05;

/// Receiver ready, next expected information frame is 1
pub const C_RR1: u8 = 0x85;

/// Reject information frame 0
pub const C_REJ0: u8 = 0x01;

/// Reject information frame 1
pub const C_REJ1: u8 = 0x81;

/// Information frame with sequence number 0
pub const C_I0: u8 = 0x00;

/// Information frame with sequence number 1
pub const C_I1: u8 = 0x40;

/// Largest payload an information frame carries unless configured otherwise
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Upper bound on a configured payload size, a full data packet: 3 header
/// bytes plus a 16-bit length of data
pub const MAX_PAYLOAD_LIMIT: usize = 3 + u16::MAX as usize;

/// Length of a supervisory frame on the wire
pub const SU_FRAME_SIZE: usize = 5;
