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

use std::io::{Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, DataBits, Parity, StopBits};

/// How long a single `read_byte` waits before reporting no data.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Byte transport the link layer runs over
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Next byte from the line, or `None` if nothing arrived within one poll interval.
    fn read_byte(&mut self) -> std::io::Result<Option<u8>>;

    fn close(&mut self) -> std::io::Result<()>;
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// RS-232 port at 8N1 through the serialport crate
pub struct RealSerialPort {
    port: Option<Box<dyn SerialPortTrait>>,
}

impl RealSerialPort {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(POLL_INTERVAL)
            .open()?;

        Ok(RealSerialPort { port: Some(port) })
    }

    fn port(&mut self) -> std::io::Result<&mut Box<dyn SerialPortTrait>> {
        self.port.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "serial port is closed")
        })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let port = self.port()?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port()?.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush()?;
        }
        Ok(())
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
pub struct MockSerialPort {
    // Data to return on reads (None = the poll came back empty and the timer lapsed)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    lapsed: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
            lapsed: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Timer gate that expires once this port has served a `None`.
    pub fn timer(&self) -> MockTimer {
        MockTimer { armed: false, lapsed: Arc::clone(&self.lapsed) }
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        // Out of responses = the line went dead
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Mock script exhausted"
            ));
        }

        let response = self.read_buffer[self.read_pos];
        self.read_pos += 1;
        if response.is_none() {
            self.lapsed.store(true, Ordering::SeqCst);
        }
        Ok(response)
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

#[cfg(test)]
pub struct MockTimer {
    armed: bool,
    lapsed: Arc<AtomicBool>,
}

#[cfg(test)]
impl crate::timer::TimerGate for MockTimer {
    fn arm(&mut self, _duration: Duration) {
        self.armed = true;
        self.lapsed.store(false, Ordering::SeqCst);
    }

    fn expired(&mut self) -> bool {
        self.armed && self.lapsed.load(Ordering::SeqCst)
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

// ============================================================================
// In-memory Line for Two-endpoint Tests
// ============================================================================

#[cfg(test)]
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

/// Decides per `write_all` call whether the bytes reach the peer.
#[cfg(test)]
pub type LineFilter = Box<dyn FnMut(&[u8]) -> bool + Send>;

#[cfg(test)]
pub struct PipePort {
    tx: Sender<u8>,
    rx: Receiver<u8>,
    filter: Option<LineFilter>,
    closed: bool,
}

#[cfg(test)]
pub fn pipe_pair() -> (PipePort, PipePort) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        PipePort { tx: a_tx, rx: a_rx, filter: None, closed: false },
        PipePort { tx: b_tx, rx: b_rx, filter: None, closed: false },
    )
}

#[cfg(test)]
impl PipePort {
    pub fn with_filter(mut self, filter: LineFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[cfg(test)]
impl SerialPort for PipePort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "pipe closed"));
        }
        let deliver = match self.filter.as_mut() {
            Some(filter) => filter(buf),
            None => true,
        };
        if deliver {
            for &byte in buf {
                // A vanished peer is a dead line, not a local failure
                let _ = self.tx.send(byte);
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        if self.closed {
            return Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "pipe closed"));
        }
        match self.rx.recv_timeout(Duration::from_millis(5)) {
            Ok(byte) => Ok(Some(byte)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer hung up",
            )),
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
