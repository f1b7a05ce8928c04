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

//! Wire frames exchanged with the device

use crate::protocol::*;

/// XOR of every byte in a chunk payload
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// A host-to-device frame.
///
/// Frames are built, encoded and discarded on each step. Length limits are
/// enforced where the frame is constructed: `FileSource` caps the filename at
/// 255 bytes and the size at `u32::MAX`, and `Data` payloads never exceed
/// `CHUNK_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    Start { filename: &'a [u8], file_size: u32 },
    Data { payload: &'a [u8] },
    End,
}

impl Frame<'_> {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Start { filename, file_size } => {
                debug_assert!(filename.len() <= MAX_FILENAME_LEN, "filename exceeds length prefix");
                let mut out = Vec::with_capacity(2 + filename.len() + 4);
                out.push(START);
                out.push(filename.len() as u8);
                out.extend_from_slice(filename);
                out.extend_from_slice(&file_size.to_le_bytes());
                out
            }
            Frame::Data { payload } => {
                debug_assert!(payload.len() <= CHUNK_SIZE, "payload exceeds chunk size");
                let mut out = Vec::with_capacity(4 + payload.len());
                out.push(DATA);
                out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
                out.extend_from_slice(payload);
                out.push(checksum(payload));
                out
            }
            Frame::End => vec![END],
        }
    }
}

/// A single-byte reply from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack,
    Nak,
    Other(u8),
}

impl From<u8> for Response {
    fn from(byte: u8) -> Self {
        match byte {
            ACK => Response::Ack,
            NAK => Response::Nak,
            other => Response::Other(other),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
