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

//! File transfer on top of the link layer.
//!
//! ```plain
//! start: [1, 0, L, size..., 1, L, name...]
//! data:  [2, L2, L1, data...]            data length = 256 * L2 + L1
//! end:   [3, 0, L, size..., 1, L, name...]
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use crate::error::TransferError;
use crate::link::{llread, llwrite, Connection};
use crate::protocol::MAX_PAYLOAD_LIMIT;

pub const PKT_START: u8 = 0x01;
pub const PKT_DATA: u8 = 0x02;
pub const PKT_END: u8 = 0x03;

pub const T_SIZE: u8 = 0x00;
pub const T_NAME: u8 = 0x01;

const DATA_HEADER: usize = 3;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("link error: {0}")]
    Link(#[from] TransferError),

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("expected {expected} packet, got {found}")]
    UnexpectedPacket { expected: &'static str, found: &'static str },

    #[error("file announced as {expected} bytes but {received} arrived")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("file name of {0} bytes does not fit a packet")]
    NameTooLong(usize),

    #[error("maximum payload of {0} bytes leaves no room for data")]
    PayloadTooSmall(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start { size: u64, name: String },
    Data(Vec<u8>),
    End { size: u64, name: String },
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Start { .. } => "start",
            Packet::Data(_) => "data",
            Packet::End { .. } => "end",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, AppError> {
        match self {
            Packet::Start { size, name } => encode_control(PKT_START, *size, name),
            Packet::End { size, name } => encode_control(PKT_END, *size, name),
            Packet::Data(data) => {
                let len = u16::try_from(data.len())
                    .map_err(|_| AppError::MalformedPacket("data block longer than 65535 bytes"))?;
                let mut out = Vec::with_capacity(DATA_HEADER + data.len());
                out.push(PKT_DATA);
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(data);
                Ok(out)
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, AppError> {
        let (&kind, body) = bytes.split_first().ok_or(AppError::MalformedPacket("empty packet"))?;
        match kind {
            PKT_DATA => {
                if body.len() < 2 {
                    return Err(AppError::MalformedPacket("truncated data header"));
                }
                let len = 256 * body[0] as usize + body[1] as usize;
                let data = &body[2..];
                if data.len() != len {
                    return Err(AppError::MalformedPacket("data length does not match header"));
                }
                Ok(Packet::Data(data.to_vec()))
            }
            PKT_START | PKT_END => {
                let (size, name) = decode_control(body)?;
                if kind == PKT_START {
                    Ok(Packet::Start { size, name })
                } else {
                    Ok(Packet::End { size, name })
                }
            }
            _ => Err(AppError::MalformedPacket("unknown packet type")),
        }
    }
}

/// Size is sent in as few big-endian bytes as hold it, at least one.
fn encode_control(kind: u8, size: u64, name: &str) -> Result<Vec<u8>, AppError> {
    let name = name.as_bytes();
    let name_len = u8::try_from(name.len()).map_err(|_| AppError::NameTooLong(name.len()))?;

    let size_bytes = size.to_be_bytes();
    let skip = size_bytes.iter().take_while(|&&b| b == 0).count().min(size_bytes.len() - 1);
    let size_bytes = &size_bytes[skip..];

    let mut out = vec![kind, T_SIZE, size_bytes.len() as u8];
    out.extend_from_slice(size_bytes);
    out.extend_from_slice(&[T_NAME, name_len]);
    out.extend_from_slice(name);
    Ok(out)
}

fn decode_control(mut body: &[u8]) -> Result<(u64, String), AppError> {
    let mut size = None;
    let mut name = None;

    while let [tag, len, rest @ ..] = body {
        let len = *len as usize;
        if rest.len() < len {
            return Err(AppError::MalformedPacket("truncated control field"));
        }
        let (value, tail) = rest.split_at(len);
        match *tag {
            T_SIZE => {
                if value.is_empty() || value.len() > 8 {
                    return Err(AppError::MalformedPacket("bad file size field"));
                }
                size = Some(value.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64));
            }
            T_NAME => name = Some(String::from_utf8_lossy(value).into_owned()),
            // Unknown fields are skipped
            _ => {}
        }
        body = tail;
    }

    if !body.is_empty() {
        return Err(AppError::MalformedPacket("trailing byte in control packet"));
    }
    match (size, name) {
        (Some(size), Some(name)) => Ok((size, name)),
        _ => Err(AppError::MalformedPacket("control packet missing size or name")),
    }
}

fn send_packet(conn: &mut Connection, packet: &Packet) -> Result<(), AppError> {
    let bytes = packet.encode()?;
    llwrite(conn, &bytes)?;
    Ok(())
}

/// Send `path` over an open Initiator connection. Returns the bytes sent.
pub fn send_file(conn: &mut Connection, path: &Path) -> Result<u64, AppError> {
    let max_payload = conn.config().max_payload;
    if max_payload <= DATA_HEADER {
        return Err(AppError::PayloadTooSmall(max_payload));
    }
    let chunk = (max_payload - DATA_HEADER).min(u16::MAX as usize);

    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(AppError::MalformedPacket("path has no file name"))?;

    info!("Sending {} ({} bytes)", name, size);
    send_packet(conn, &Packet::Start { size, name: name.clone() })?;

    let mut buf = vec![0u8; chunk];
    let mut sent = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        send_packet(conn, &Packet::Data(buf[..n].to_vec()))?;
        sent += n as u64;
        debug!("Sent {}/{} bytes", sent, size);
    }

    send_packet(conn, &Packet::End { size: sent, name })?;
    info!("Sent {} bytes", sent);
    Ok(sent)
}

fn read_packet(conn: &mut Connection, buf: &mut [u8]) -> Result<Packet, AppError> {
    let n = llread(conn, buf)?;
    Packet::decode(&buf[..n])
}

/// Receive one file into `output_dir` over an open Responder connection.
/// Returns the path written.
pub fn receive_file(conn: &mut Connection, output_dir: &Path) -> Result<PathBuf, AppError> {
    let mut buf = vec![0u8; conn.config().max_payload.min(MAX_PAYLOAD_LIMIT)];

    let (size, name) = match read_packet(conn, &mut buf)? {
        Packet::Start { size, name } => (size, name),
        other => return Err(AppError::UnexpectedPacket { expected: "start", found: other.kind() }),
    };

    // Only the final component, the sender does not pick our directories
    let file_name = Path::new(&name)
        .file_name()
        .ok_or(AppError::MalformedPacket("start packet names no file"))?;
    let path = output_dir.join(file_name);
    info!("Receiving {} ({} bytes) into {}", name, size, path.display());

    let mut file = File::create(&path)?;
    let mut received = 0u64;
    loop {
        match read_packet(conn, &mut buf)? {
            Packet::Data(data) => {
                file.write_all(&data)?;
                received += data.len() as u64;
                debug!("Received {}/{} bytes", received, size);
            }
            Packet::End { size: end_size, .. } => {
                file.flush()?;
                if received != size || end_size != size {
                    return Err(AppError::SizeMismatch { expected: size, received });
                }
                break;
            }
            other @ Packet::Start { .. } => {
                return Err(AppError::UnexpectedPacket { expected: "data", found: other.kind() });
            }
        }
    }

    info!("Received {} bytes", received);
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use crate::link::{llclose, LinkConfig, Role};
    use crate::serial::pipe_pair;
    use crate::timer::Alarm;

    #[test]
    fn test_start_packet_layout() {
        let packet = Packet::Start { size: 10968, name: "pinguim.gif".to_string() };
        let bytes = packet.encode().unwrap();

        let mut expected = vec![PKT_START, T_SIZE, 2, 0x2A, 0xD8, T_NAME, 11];
        expected.extend_from_slice(b"pinguim.gif");
        assert_eq!(bytes, expected);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_empty_file_size_uses_one_byte() {
        let bytes = Packet::End { size: 0, name: "e".to_string() }.encode().unwrap();
        assert_eq!(bytes, vec![PKT_END, T_SIZE, 1, 0x00, T_NAME, 1, b'e']);
    }

    #[test]
    fn test_data_packet_layout() {
        let data = vec![0xAB; 300];
        let bytes = Packet::Data(data.clone()).encode().unwrap();
        assert_eq!(&bytes[..3], &[PKT_DATA, 0x01, 0x2C]);
        assert_eq!(Packet::decode(&bytes).unwrap(), Packet::Data(data));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(Packet::decode(&[]), Err(AppError::MalformedPacket(_))));
        assert!(matches!(Packet::decode(&[0x09]), Err(AppError::MalformedPacket(_))));
        assert!(matches!(Packet::decode(&[PKT_DATA, 0, 5, 1, 2]), Err(AppError::MalformedPacket(_))));
        assert!(matches!(Packet::decode(&[PKT_START, T_SIZE, 4, 1]), Err(AppError::MalformedPacket(_))));
        assert!(matches!(Packet::decode(&[PKT_START, T_SIZE, 1, 7]), Err(AppError::MalformedPacket(_))));
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let bytes = [PKT_START, 0x07, 2, 0xFF, 0xFF, T_SIZE, 1, 9, T_NAME, 1, b'x'];
        assert_eq!(
            Packet::decode(&bytes).unwrap(),
            Packet::Start { size: 9, name: "x".to_string() }
        );
    }

    #[test]
    fn test_name_too_long() {
        let packet = Packet::Start { size: 1, name: "n".repeat(256) };
        assert!(matches!(packet.encode(), Err(AppError::NameTooLong(256))));
    }

    fn pipe_config(role: Role) -> LinkConfig {
        LinkConfig::new("pipe", 115200, role)
            .with_retries(5)
            .with_timeout(Duration::from_millis(200))
            .with_max_payload(64)
    }

    #[test]
    fn test_file_transfer_over_pipe() {
        let dir = std::env::temp_dir().join(format!("serlink_app_{}", std::process::id()));
        let out_dir = dir.join("out");
        std::fs::create_dir_all(&out_dir).unwrap();

        let source = dir.join("payload.bin");
        let content: Vec<u8> = (0..500u32).map(|i| [0x7E, 0x7D, i as u8][i as usize % 3]).collect();
        std::fs::write(&source, &content).unwrap();

        let (tx_port, rx_port) = pipe_pair();

        let receiver_dir = out_dir.clone();
        let responder = thread::spawn(move || {
            let mut conn = Connection::open_with(
                pipe_config(Role::Responder),
                Box::new(rx_port),
                Box::new(Alarm::new()),
            ).expect("responder open");
            let path = receive_file(&mut conn, &receiver_dir).expect("receive");
            llclose(&mut conn).expect("responder close");
            path
        });

        let mut conn = Connection::open_with(
            pipe_config(Role::Initiator),
            Box::new(tx_port),
            Box::new(Alarm::new()),
        ).expect("initiator open");
        assert_eq!(send_file(&mut conn, &source).unwrap(), 500);
        llclose(&mut conn).expect("initiator close");

        let written = responder.join().expect("responder thread");
        assert_eq!(written, out_dir.join("payload.bin"));
        assert_eq!(std::fs::read(&written).unwrap(), content);

        std::fs::remove_dir_all(&dir).ok();
    }
}
