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

//! Stop-and-wait transfer of information frames.
//!
//! The sender keeps exactly one frame outstanding and waits for
//! `RR(send_seq ^ 1)`. The receiver delivers a frame only when it carries
//! `recv_seq`; a frame carrying the other number is a retransmission whose
//! acknowledgment was lost and is answered with `RR(recv_seq)` again.

use tracing::{debug, warn};
use crate::error::TransferError;
use crate::frame::{encode_information, FrameKind};
use crate::link::{Connection, ConnectionState, Event, Role};
use crate::protocol::C_SET;
use crate::receiver::Expectation;

impl Connection {
    /// Deliver `payload` to the peer. Returns once it is acknowledged.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize, TransferError> {
        if self.state != ConnectionState::Open || self.send_failed {
            return Err(TransferError::LinkDown);
        }

        let seq = self.send_seq;
        let frame = encode_information(self.address(), seq, payload, self.config.max_payload)?;
        let replies = [
            FrameKind::ReceiveReady(seq.toggled()).control(),
            FrameKind::Reject(seq).control(),
        ];
        let expect = Expectation::supervisory(self.peer_address(), &replies);
        let label = format!("I{} ({} bytes)", seq, payload.len());

        let accepted = |reply: &FrameKind| matches!(reply, FrameKind::ReceiveReady(_));
        let reply = match self.exchange(&frame, &label, &expect, accepted) {
            Ok(reply) => reply,
            Err(e) => {
                self.send_failed = true;
                return Err(e.into());
            }
        };

        match reply {
            Some(_) => {
                self.send_seq = seq.toggled();
                self.stats.data_bytes += payload.len() as u64;
                Ok(payload.len())
            }
            None => {
                self.send_failed = true;
                warn!("Giving up on {} after {} attempts", label, self.config.retries);
                Err(TransferError::DeliveryFailed { attempts: self.config.retries })
            }
        }
    }

    /// Block until the next new information frame arrives and copy its
    /// payload into `out`. Returns the payload length.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, TransferError> {
        if self.state != ConnectionState::Open {
            return Err(TransferError::LinkDown);
        }

        let mut expect = Expectation::information(self.peer_address());
        if self.config.role == Role::Responder {
            // The initiator repeats SET if our UA got lost
            expect = expect.or_supervisory(&[C_SET]);
        }

        loop {
            match self.next_event(&expect, false)? {
                Event::Frame(FrameKind::Information(seq, payload)) if seq == self.recv_seq => {
                    if payload.len() > out.len() {
                        return Err(TransferError::FrameTooLarge {
                            len: payload.len(),
                            capacity: out.len(),
                        });
                    }
                    out[..payload.len()].copy_from_slice(&payload);
                    self.recv_seq = seq.toggled();
                    self.reply(FrameKind::ReceiveReady(self.recv_seq))?;
                    self.stats.data_bytes += payload.len() as u64;
                    debug!("Delivered {} bytes", payload.len());
                    return Ok(payload.len());
                }
                Event::Frame(FrameKind::Information(seq, _)) => {
                    self.acknowledge_duplicate(seq)?;
                }
                Event::PayloadCorrupt(seq) if seq == self.recv_seq => {
                    self.stats.rej_sent += 1;
                    warn!("Rejecting I{}", seq);
                    self.reply(FrameKind::Reject(seq))?;
                }
                Event::PayloadCorrupt(seq) => {
                    self.acknowledge_duplicate(seq)?;
                }
                Event::Frame(FrameKind::Set) => {
                    warn!("Peer repeated SET, answering UA again");
                    self.reply(FrameKind::UnnumberedAck)?;
                }
                Event::Frame(_) | Event::Expired => {}
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
