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

//! Error types for the transfer tool

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Source path does not exist. Checked before the link is opened.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("filename is {len} bytes, the protocol allows at most 255")]
    FilenameTooLong { len: usize },

    #[error("file is {len} bytes, the protocol allows at most 4294967295")]
    FileTooLarge { len: u64 },

    /// Reading the file being sent failed.
    #[error("source read error: {0}")]
    Source(#[source] std::io::Error),

    /// The serial port could not be opened.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Read, write, flush or buffer reset failed on an open link.
    #[error("link error: {source} (in state: {state})")]
    Link {
        state: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no response from device (in state: {state})")]
    Timeout { state: &'static str },

    /// The device answered the header with something other than ACK.
    #[error("expected ACK, got 0x{got:02X}{}", format_trailing(trailing))]
    ProtocolMismatch { got: u8, trailing: Vec<u8> },

    #[error("max retries exceeded after {attempts} attempts at byte {offset}")]
    MaxRetriesExceeded { offset: u32, attempts: u32 },
}

impl TransferError {
    /// True for failures of the underlying serial transport
    pub fn is_link_error(&self) -> bool {
        matches!(self, TransferError::Open { .. } | TransferError::Link { .. })
    }
}

fn format_trailing(trailing: &[u8]) -> String {
    if trailing.is_empty() {
        return String::new();
    }
    let hex: Vec<String> = trailing.iter().map(|b| format!("0x{:02X}", b)).collect();
    format!(" (additional bytes in buffer: {}, as ASCII: {:?})", hex.join(" "), String::from_utf8_lossy(trailing))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid data bits: {0}. Must be 5, 6, 7, or 8")]
    DataBits(u8),

    #[error("invalid parity: {0}. Must be 'none', 'odd', or 'even'")]
    Parity(String),

    #[error("invalid stop bits: {0}. Must be 1 or 2")]
    StopBits(u8),

    #[error("retry limit must be at least 1")]
    Retries,
}
