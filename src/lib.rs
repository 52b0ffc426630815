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

//! HDLC-style stop-and-wait link layer over a serial line.

pub mod app;
mod arq;
pub mod error;
pub mod frame;
pub mod link;
pub mod protocol;
pub mod receiver;
pub mod serial;
pub mod stats;
pub mod timer;

pub use error::{CloseError, ConnectionError, FrameError, TransferError};
pub use link::{llclose, llopen, llread, llwrite, Connection, ConnectionState, LinkConfig, Role};
pub use stats::Statistics;
