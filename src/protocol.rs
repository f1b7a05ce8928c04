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

//! Serial file transfer protocol constants

use std::time::Duration;

/// Start of transfer - followed by filename length, filename and 4-byte LE file size
pub const START: u8 = 0xAA;

/// Data chunk - followed by 2-byte LE length, payload and XOR checksum
pub const DATA: u8 = 0xBB;

/// End of transfer - all chunks have been acknowledged
pub const END: u8 = 0xCC;

/// Acknowledge - device accepted the last frame
pub const ACK: u8 = 0xDD;

/// Negative acknowledge - device rejected the last frame, resend it
pub const NAK: u8 = 0xEE;

/// Maximum payload carried by a single data frame
pub const CHUNK_SIZE: usize = 512;

/// Attempts allowed per chunk before the session is abandoned
pub const MAX_RETRIES: u32 = 3;

/// Longest filename the one-byte length prefix can describe
pub const MAX_FILENAME_LEN: usize = u8::MAX as usize;

/// Bound on every single-byte response read
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Time given to the operator to arm the receiver
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Pause after opening the port so the device side can settle
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// How long to wait for stray bytes before draining them for diagnostics
pub const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// Most stray bytes collected for a diagnostic dump
pub const DRAIN_LIMIT: usize = 256;

pub const DEFAULT_BAUD: u32 = 115_200;
