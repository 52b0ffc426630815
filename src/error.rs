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

//! Error types surfaced by the link layer.
//!
//! Checksum failures, address mismatches and duplicate frames never show up
//! here: the engine recovers from them on its own. Only an exhausted retry
//! budget, a failing transport or an oversized payload reaches the caller.

use thiserror::Error;

/// Errors building a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the {max} byte maximum")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Errors from `llopen`.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer did not answer after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("transport failure: {0}")]
    TransportFailure(#[from] std::io::Error),
}

/// Errors from `llwrite` and `llread`.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("frame not acknowledged after {attempts} attempts")]
    DeliveryFailed { attempts: u32 },

    #[error("payload of {len} bytes exceeds the {max} byte maximum")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("received {len} payload bytes but the buffer holds {capacity}")]
    FrameTooLarge { len: usize, capacity: usize },

    #[error("link is not open for transfers")]
    LinkDown,

    #[error("transport failure: {0}")]
    TransportFailure(#[from] std::io::Error),
}

impl From<FrameError> for TransferError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { len, max } => TransferError::PayloadTooLarge { len, max },
        }
    }
}

/// Errors from `llclose`. The transport is closed even when one is returned.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("disconnect not confirmed after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("transport failure: {0}")]
    TransportFailure(#[from] std::io::Error),
}
