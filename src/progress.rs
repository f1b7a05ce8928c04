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

//! Progress reporting for acknowledged chunks

use std::io::Write;

/// Receives `(bytes_sent, total)` after every acknowledged chunk.
///
/// Calls are made synchronously from the engine, so implementations should
/// return quickly. `bytes_sent` never decreases within a session.
pub trait ProgressSink: Send {
    fn chunk_acked(&mut self, bytes_sent: u32, total: u32);
}

impl<F> ProgressSink for F
where
    F: FnMut(u32, u32) + Send,
{
    fn chunk_acked(&mut self, bytes_sent: u32, total: u32) {
        self(bytes_sent, total)
    }
}

/// Discards progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn chunk_acked(&mut self, _bytes_sent: u32, _total: u32) {}
}

/// Rewrites a single progress line on stdout
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn chunk_acked(&mut self, bytes_sent: u32, total: u32) {
        print!("\rProgress: {}/{} bytes ({}%)", bytes_sent, total, percent(bytes_sent, total));
        std::io::stdout().flush().ok();
    }
}

pub fn percent(bytes_sent: u32, total: u32) -> u64 {
    if total == 0 {
        return 100;
    }
    bytes_sent as u64 * 100 / total as u64
}
