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

//! Connection establishment and teardown.
//!
//! ```plain
//! initiator                responder
//!     SET   ---------------->
//!           <----------------   UA
//!     I/RR exchanges (see arq)
//!     DISC  ---------------->
//!           <----------------   DISC
//!     UA    ---------------->
//! ```
//!
//! Every frame carries the address of the side that originated it.

use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::error::{CloseError, ConnectionError, TransferError};
use crate::frame::{encode_supervisory, FrameKind, RawFrame, Seq};
use crate::protocol::*;
use crate::receiver::{Checksum, Expectation, FrameReceiver, Outcome};
use crate::serial::{RealSerialPort, SerialPort};
use crate::stats::Statistics;
use crate::timer::{Alarm, TimerGate};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// Address stamped on frames this side originates.
    pub fn address(self) -> u8 {
        match self {
            Role::Initiator => A_TX,
            Role::Responder => A_RX,
        }
    }

    pub fn peer_address(self) -> u8 {
        match self {
            Role::Initiator => A_RX,
            Role::Responder => A_TX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    pub role: Role,
    /// Transmission attempts per exchange before giving up
    pub retries: u32,
    /// How long each attempt waits for the peer
    pub timeout: Duration,
    pub max_payload: usize,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32, role: Role) -> Self {
        LinkConfig {
            port: port.into(),
            baud_rate,
            role,
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Values above `MAX_PAYLOAD_LIMIT` are clamped to it.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.min(MAX_PAYLOAD_LIMIT);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Establishing,
    Open,
    Closing,
}

/// What a wait on the line produced.
pub(crate) enum Event {
    Frame(FrameKind),
    /// Information frame whose BCC2 did not match
    PayloadCorrupt(Seq),
    Expired,
}

// ============================================================================
// Connection
// ============================================================================

pub struct Connection {
    pub(crate) config: LinkConfig,
    port: Box<dyn SerialPort>,
    timer: Box<dyn TimerGate>,
    receiver: FrameReceiver,
    pub(crate) state: ConnectionState,
    pub(crate) send_seq: Seq,
    pub(crate) recv_seq: Seq,
    /// Set once an `llwrite` gave up; only `llclose` is allowed afterwards
    pub(crate) send_failed: bool,
    pub(crate) stats: Statistics,
}

impl Connection {
    /// Open the configured serial port and run the establishment handshake.
    pub fn open(config: LinkConfig) -> Result<Self, ConnectionError> {
        let port = RealSerialPort::open(&config.port, config.baud_rate).map_err(io::Error::from)?;
        info!("Opened {} at {} baud", config.port, config.baud_rate);
        Self::open_with(config, Box::new(port), Box::new(Alarm::new()))
    }

    /// Run the establishment handshake over an already open transport.
    pub fn open_with(
        config: LinkConfig,
        port: Box<dyn SerialPort>,
        timer: Box<dyn TimerGate>,
    ) -> Result<Self, ConnectionError> {
        let receiver = FrameReceiver::new(config.max_payload);
        let mut conn = Connection {
            config,
            port,
            timer,
            receiver,
            state: ConnectionState::Establishing,
            send_seq: Seq::Zero,
            recv_seq: Seq::Zero,
            send_failed: false,
            stats: Statistics::new(),
        };

        let result = match conn.config.role {
            Role::Initiator => conn.establish_initiator(),
            Role::Responder => conn.establish_responder(),
        };

        match result {
            Ok(()) => {
                conn.send_seq = Seq::Zero;
                conn.recv_seq = Seq::Zero;
                conn.state = ConnectionState::Open;
                info!("Connection established as {:?}", conn.config.role);
                Ok(conn)
            }
            Err(e) => {
                conn.timer.disarm();
                conn.state = ConnectionState::Closed;
                if let Err(close_err) = conn.port.close() {
                    warn!("Failed to close transport after failed open: {}", close_err);
                }
                Err(e)
            }
        }
    }

    fn establish_initiator(&mut self) -> Result<(), ConnectionError> {
        let set = self.frame(&FrameKind::Set);
        let expect = Expectation::supervisory(self.peer_address(), &[C_UA]);

        match self.exchange(&set, "SET", &expect, |_| true)? {
            Some(_) => Ok(()),
            None => Err(ConnectionError::Timeout { attempts: self.config.retries }),
        }
    }

    fn establish_responder(&mut self) -> Result<(), ConnectionError> {
        let expect = Expectation::supervisory(self.peer_address(), &[C_SET]);
        loop {
            if let Event::Frame(FrameKind::Set) = self.next_event(&expect, false)? {
                break;
            }
        }
        self.reply(FrameKind::UnnumberedAck)?;
        Ok(())
    }

    /// Run the teardown handshake and close the transport.
    ///
    /// The transport is closed even when the handshake fails.
    pub fn close(&mut self) -> Result<(), CloseError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closing;
        info!("Closing connection");

        let handshake = match self.config.role {
            Role::Initiator => self.close_initiator(),
            Role::Responder => self.close_responder(),
        };

        self.timer.disarm();
        let closed = self.port.close();
        self.state = ConnectionState::Closed;
        self.stats.finish();

        if let Err(e) = handshake {
            warn!("Disconnect handshake failed: {}", e);
            return Err(e);
        }
        closed?;
        info!("Connection closed");
        Ok(())
    }

    fn close_initiator(&mut self) -> Result<(), CloseError> {
        let disc = self.frame(&FrameKind::Disconnect);
        let expect = Expectation::supervisory(self.peer_address(), &[C_DISC]);

        match self.exchange(&disc, "DISC", &expect, |_| true)? {
            Some(_) => {
                self.reply(FrameKind::UnnumberedAck)?;
                Ok(())
            }
            None => Err(CloseError::Timeout { attempts: self.config.retries }),
        }
    }

    fn close_responder(&mut self) -> Result<(), CloseError> {
        // A sender whose last RR got lost keeps repeating its final frame
        let expect = Expectation::information(self.peer_address()).or_supervisory(&[C_DISC]);
        loop {
            match self.next_event(&expect, false)? {
                Event::Frame(FrameKind::Disconnect) => break,
                Event::Frame(FrameKind::Information(seq, _)) | Event::PayloadCorrupt(seq)
                    if seq != self.recv_seq =>
                {
                    self.acknowledge_duplicate(seq)?;
                }
                _ => {}
            }
        }

        // A repeated DISC means ours was lost, answer it with another round
        let disc = self.frame(&FrameKind::Disconnect);
        let expect = Expectation::supervisory(self.peer_address(), &[C_UA, C_DISC]);
        match self.exchange(&disc, "DISC", &expect, |reply| *reply == FrameKind::UnnumberedAck)? {
            Some(_) => Ok(()),
            None => Err(CloseError::Timeout { attempts: self.config.retries }),
        }
    }

    // ========================================================================
    // Line Primitives
    // ========================================================================

    pub(crate) fn address(&self) -> u8 {
        self.config.role.address()
    }

    pub(crate) fn peer_address(&self) -> u8 {
        self.config.role.peer_address()
    }

    /// Supervisory frame originated by this side.
    fn frame(&self, kind: &FrameKind) -> RawFrame {
        encode_supervisory(self.address(), kind.control())
    }

    fn io_error(&self, e: io::Error) -> io::Error {
        io::Error::new(e.kind(), format!("{} (in state: {:?})", e, self.state))
    }

    fn write_frame(&mut self, frame: &RawFrame) -> io::Result<()> {
        if let Err(e) = self.port.write_all(frame) {
            return Err(self.io_error(e));
        }
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Send a single supervisory frame, no answer expected.
    pub(crate) fn reply(&mut self, kind: FrameKind) -> io::Result<()> {
        let frame = self.frame(&kind);
        debug!("Sent: {}", kind);
        self.write_frame(&frame)
    }

    pub(crate) fn acknowledge_duplicate(&mut self, seq: Seq) -> io::Result<()> {
        self.stats.duplicates += 1;
        warn!("Duplicate I{}, repeating RR{}", seq, self.recv_seq);
        self.reply(FrameKind::ReceiveReady(self.recv_seq))
    }

    /// Read until a frame matching `expect` is decided, or until the timer
    /// expires when `timed` is set. Noise is counted and skipped.
    pub(crate) fn next_event(&mut self, expect: &Expectation, timed: bool) -> io::Result<Event> {
        self.receiver.reset();
        loop {
            if timed && self.timer.expired() {
                return Ok(Event::Expired);
            }

            let byte = match self.port.read_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => continue,
                Err(e) => return Err(self.io_error(e)),
            };

            match self.receiver.feed(byte, expect) {
                None => {}
                Some(Outcome::Frame(kind)) => {
                    debug!("Received: {}", kind);
                    self.stats.frames_received += 1;
                    return Ok(Event::Frame(kind));
                }
                Some(Outcome::ChecksumMismatch(Checksum::Header)) => {
                    self.stats.header_errors += 1;
                    warn!("Discarded frame with bad BCC1");
                }
                Some(Outcome::ChecksumMismatch(Checksum::Payload(seq))) => {
                    self.stats.payload_errors += 1;
                    warn!("I{} failed BCC2 check", seq);
                    return Ok(Event::PayloadCorrupt(seq));
                }
                Some(Outcome::FrameTooLarge) => {
                    self.stats.overflows += 1;
                    warn!("Discarded frame larger than {} bytes", self.config.max_payload);
                }
            }
        }
    }

    /// Send `frame` and wait for a reply, retransmitting on timeout or when
    /// `done` rejects the reply, for at most `config.retries` attempts.
    /// Returns `None` once the attempts run out.
    pub(crate) fn exchange(
        &mut self,
        frame: &RawFrame,
        label: &str,
        expect: &Expectation,
        done: impl Fn(&FrameKind) -> bool,
    ) -> io::Result<Option<FrameKind>> {
        let attempts = self.config.retries;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.stats.retransmissions += 1;
                warn!("Retransmitting {} (attempt {}/{})", label, attempt, attempts);
            }
            debug!("Sent: {}", label);
            self.write_frame(frame)?;
            self.timer.arm(self.config.timeout);

            match self.await_reply(expect)? {
                Some(reply) if done(&reply) => return Ok(Some(reply)),
                Some(FrameKind::Reject(seq)) => {
                    self.stats.rej_received += 1;
                    warn!("Peer rejected {} with REJ{}", label, seq);
                }
                Some(_) | None => {}
            }
        }

        self.timer.disarm();
        Ok(None)
    }

    fn await_reply(&mut self, expect: &Expectation) -> io::Result<Option<FrameKind>> {
        loop {
            match self.next_event(expect, true)? {
                Event::Frame(kind) => {
                    self.timer.disarm();
                    return Ok(Some(kind));
                }
                Event::Expired => {
                    self.stats.timeouts += 1;
                    warn!("Timed out after {:?}", self.config.timeout);
                    return Ok(None);
                }
                Event::PayloadCorrupt(_) => {}
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn send_seq(&self) -> Seq {
        self.send_seq
    }

    pub fn recv_seq(&self) -> Seq {
        self.recv_seq
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }
}

// ============================================================================
// Link Layer Entry Points
// ============================================================================

pub fn llopen(config: LinkConfig) -> Result<Connection, ConnectionError> {
    Connection::open(config)
}

pub fn llwrite(conn: &mut Connection, payload: &[u8]) -> Result<usize, TransferError> {
    conn.write(payload)
}

pub fn llread(conn: &mut Connection, out: &mut [u8]) -> Result<usize, TransferError> {
    conn.read(out)
}

pub fn llclose(conn: &mut Connection) -> Result<(), CloseError> {
    conn.close()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use crate::serial::MockSerialPort;

    pub(crate) fn config(role: Role) -> LinkConfig {
        LinkConfig::new("mock", 9600, role)
            .with_retries(3)
            .with_timeout(Duration::from_secs(1))
    }

    pub(crate) fn script(frames: &[&[u8]]) -> Vec<Option<u8>> {
        frames.iter().flat_map(|f| f.iter().map(|&b| Some(b))).collect()
    }

    pub(crate) fn su(address: u8, control: u8) -> Vec<u8> {
        encode_supervisory(address, control).into_bytes()
    }

    pub(crate) fn open_mock(
        role: Role,
        responses: Vec<Option<u8>>,
        expected_writes: Vec<u8>,
    ) -> Result<Connection, ConnectionError> {
        let port = MockSerialPort::new(responses, expected_writes);
        let timer = port.timer();
        Connection::open_with(config(role), Box::new(port), Box::new(timer))
    }

    #[test]
    fn test_roles_use_originator_address() {
        assert_eq!(Role::Initiator.address(), A_TX);
        assert_eq!(Role::Initiator.peer_address(), A_RX);
        assert_eq!(Role::Responder.address(), A_RX);
        assert_eq!(Role::Responder.peer_address(), A_TX);
    }

    #[test]
    fn test_config_defaults() {
        let config = LinkConfig::new("/dev/ttyS0", 38400, Role::Responder);
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.max_payload, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_config_clamps_max_payload() {
        let config = LinkConfig::new("/dev/ttyS0", 9600, Role::Initiator).with_max_payload(usize::MAX);
        assert_eq!(config.max_payload, MAX_PAYLOAD_LIMIT);

        let config = config.with_max_payload(64);
        assert_eq!(config.max_payload, 64);
    }

    #[test]
    fn test_initiator_open() {
        let conn = open_mock(
            Role::Initiator,
            script(&[&su(A_RX, C_UA)]),
            su(A_TX, C_SET),
        ).expect("open should succeed");

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.send_seq(), Seq::Zero);
        assert_eq!(conn.recv_seq(), Seq::Zero);
    }

    #[test]
    fn test_initiator_open_third_attempt() {
        let mut responses = vec![None, None];
        responses.extend(script(&[&su(A_RX, C_UA)]));

        let mut expected_writes = su(A_TX, C_SET);
        expected_writes.extend(su(A_TX, C_SET));
        expected_writes.extend(su(A_TX, C_SET));

        let conn = open_mock(Role::Initiator, responses, expected_writes)
            .expect("third SET should be acknowledged");

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.send_seq(), Seq::Zero);
        assert_eq!(conn.statistics().timeouts, 2);
        assert_eq!(conn.statistics().retransmissions, 2);
    }

    #[test]
    fn test_initiator_open_timeout_closes_port() {
        let port = MockSerialPort::new(vec![None, None, None], su(A_TX, C_SET).repeat(3));
        let closed = port.closed_flag();
        let timer = port.timer();

        let result = Connection::open_with(config(Role::Initiator), Box::new(port), Box::new(timer));

        assert!(matches!(result, Err(ConnectionError::Timeout { attempts: 3 })));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_initiator_open_ignores_noise() {
        // Bad BCC1, the wrong address and an unrelated control all come before the real UA
        let responses = script(&[
            &[0x11, 0x22],
            &[FLAG, A_RX, C_UA, 0x00, FLAG],
            &su(A_TX, C_UA),
            &su(A_RX, C_DISC),
            &su(A_RX, C_UA),
        ]);

        let conn = open_mock(Role::Initiator, responses, su(A_TX, C_SET))
            .expect("noise must not fail the handshake");
        assert_eq!(conn.statistics().header_errors, 1);
    }

    #[test]
    fn test_responder_open() {
        let responses = script(&[&[0x00], &su(A_TX, C_SET)]);
        let conn = open_mock(Role::Responder, responses, su(A_RX, C_UA))
            .expect("open should succeed");

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.role(), Role::Responder);
    }

    #[test]
    fn test_responder_open_waits_through_silence() {
        let mut responses = vec![None, None, None, None];
        responses.extend(script(&[&su(A_TX, C_SET)]));

        let conn = open_mock(Role::Responder, responses, su(A_RX, C_UA));
        assert!(conn.is_ok());
    }

    #[test]
    fn test_responder_open_transport_failure() {
        let result = open_mock(Role::Responder, vec![None], vec![]);
        assert!(matches!(result, Err(ConnectionError::TransportFailure(_))));
    }

    #[test]
    fn test_initiator_close() {
        let port = MockSerialPort::new(
            script(&[&su(A_RX, C_UA), &su(A_RX, C_DISC)]),
            [su(A_TX, C_SET), su(A_TX, C_DISC), su(A_TX, C_UA)].concat(),
        );
        let closed = port.closed_flag();
        let timer = port.timer();
        let mut conn = Connection::open_with(config(Role::Initiator), Box::new(port), Box::new(timer))
            .expect("open should succeed");

        llclose(&mut conn).expect("close should succeed");

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_initiator_close_timeout_still_closes_port() {
        let mut responses = script(&[&su(A_RX, C_UA)]);
        responses.extend([None, None, None]);

        let port = MockSerialPort::new(
            responses,
            [su(A_TX, C_SET), su(A_TX, C_DISC), su(A_TX, C_DISC), su(A_TX, C_DISC)].concat(),
        );
        let closed = port.closed_flag();
        let timer = port.timer();
        let mut conn = Connection::open_with(config(Role::Initiator), Box::new(port), Box::new(timer))
            .expect("open should succeed");

        let result = conn.close();

        assert!(matches!(result, Err(CloseError::Timeout { attempts: 3 })));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_responder_close() {
        let port = MockSerialPort::new(
            script(&[&su(A_TX, C_SET), &su(A_TX, C_DISC), &su(A_TX, C_UA)]),
            [su(A_RX, C_UA), su(A_RX, C_DISC)].concat(),
        );
        let closed = port.closed_flag();
        let timer = port.timer();
        let mut conn = Connection::open_with(config(Role::Responder), Box::new(port), Box::new(timer))
            .expect("open should succeed");

        conn.close().expect("close should succeed");

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_responder_close_repeats_lost_disc() {
        // Our first DISC is lost: the peer repeats its DISC, then the UA arrives
        let responses = script(&[
            &su(A_TX, C_SET),
            &su(A_TX, C_DISC),
            &su(A_TX, C_DISC),
            &su(A_TX, C_UA),
        ]);
        let expected_writes = [su(A_RX, C_UA), su(A_RX, C_DISC), su(A_RX, C_DISC)].concat();

        let mut conn = open_mock(Role::Responder, responses, expected_writes)
            .expect("open should succeed");
        conn.close().expect("close should succeed");
    }

    #[test]
    fn test_responder_close_without_final_ua() {
        let mut responses = script(&[&su(A_TX, C_SET), &su(A_TX, C_DISC)]);
        responses.extend([None, None, None]);
        let expected_writes = [su(A_RX, C_UA), su(A_RX, C_DISC).repeat(3)].concat();

        let mut conn = open_mock(Role::Responder, responses, expected_writes)
            .expect("open should succeed");

        assert!(matches!(conn.close(), Err(CloseError::Timeout { attempts: 3 })));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut conn = open_mock(
            Role::Initiator,
            script(&[&su(A_RX, C_UA), &su(A_RX, C_DISC)]),
            [su(A_TX, C_SET), su(A_TX, C_DISC), su(A_TX, C_UA)].concat(),
        ).expect("open should succeed");

        conn.close().expect("close should succeed");
        conn.close().expect("second close does nothing");
    }
}
