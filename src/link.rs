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

use std::io::{ErrorKind, Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use serialport::{ClearBuffer, SerialPort};
use tracing::debug;
use crate::config::SerialSettings;

// ============================================================================
// Link Trait
// ============================================================================

/// Byte-oriented transport the transfer engine drives
pub trait Link: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()>;

    /// Reads whatever is available, waiting at most `timeout`.
    /// `Ok(0)` and `ErrorKind::TimedOut` both mean nothing arrived.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    /// Discards anything pending in the input and output buffers
    fn reset_buffers(&mut self) -> std::io::Result<()>;

    fn close(&mut self);

    /// Reads one byte, `None` on timeout
    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read_timeout(&mut buf, timeout) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Collects bytes until the line stays quiet for `quiet` or `limit`
    /// bytes have been read
    fn drain(&mut self, quiet: Duration, limit: usize) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < limit {
            let want = buf.len().min(limit - out.len());
            match self.read_timeout(&mut buf[..want], quiet) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Serial Port Implementation
// ============================================================================

/// Link over a real serial port via the serialport crate
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn open(settings: &SerialSettings) -> Result<Self, serialport::Error> {
        let port = serialport::new(&settings.port, settings.baud)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(SerialLink { port: Some(port) })
    }

    fn port(&mut self) -> std::io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Link for SerialLink {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port()?.write_all(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port()?.flush()
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        let port = self.port()?;
        port.set_timeout(timeout)
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        port.read(buf)
    }

    fn reset_buffers(&mut self) -> std::io::Result<()> {
        self.port()?
            .clear(ClearBuffer::All)
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))
    }

    fn close(&mut self) {
        // Dropping the handle closes the device
        self.port = None;
    }
}

// ============================================================================
// Scoped Ownership
// ============================================================================

/// Owns the link for one session and releases it on every exit path
pub struct LinkGuard {
    link: Box<dyn Link>,
}

impl LinkGuard {
    pub fn new(link: Box<dyn Link>) -> Self {
        LinkGuard { link }
    }
}

impl Deref for LinkGuard {
    type Target = dyn Link;

    fn deref(&self) -> &Self::Target {
        &*self.link
    }
}

impl DerefMut for LinkGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.link
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        if let Err(e) = self.link.flush() {
            debug!("flush on release failed: {}", e);
        }
        self.link.close();
        debug!("link released");
    }
}

// ============================================================================
// Mock Link for Testing
// ============================================================================

/// Everything a `MockLink` observed, shared with the test that created it
#[cfg(test)]
#[derive(Debug, Default)]
pub struct LinkRecord {
    pub writes: Vec<u8>,
    // One entry per write_all call
    pub frames: Vec<Vec<u8>>,
    pub flushes: usize,
    pub resets: usize,
    pub closed: bool,
}

#[cfg(test)]
pub type SharedRecord = std::sync::Arc<std::sync::Mutex<LinkRecord>>;

#[cfg(test)]
pub struct MockLink {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Writes allowed before write_all starts failing
    write_budget: Option<usize>,
    record: SharedRecord,
}

#[cfg(test)]
impl MockLink {
    pub fn new(responses: Vec<Option<u8>>) -> (Self, SharedRecord) {
        let record = SharedRecord::default();
        let mock = MockLink {
            read_buffer: responses,
            read_pos: 0,
            write_budget: None,
            record: record.clone(),
        };
        (mock, record)
    }

    pub fn failing_after(responses: Vec<Option<u8>>, writes: usize) -> (Self, SharedRecord) {
        let (mut mock, record) = MockLink::new(responses);
        mock.write_budget = Some(writes);
        (mock, record)
    }
}

#[cfg(test)]
impl Link for MockLink {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(std::io::Error::new(ErrorKind::BrokenPipe, "Mock write failure"));
            }
            *budget -= 1;
        }
        let mut record = self.record.lock().unwrap();
        record.writes.extend_from_slice(buf);
        record.frames.push(buf.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.record.lock().unwrap().flushes += 1;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        // Out of responses = timeout
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "Mock timeout"));
        }

        // If current response is None = timeout
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(std::io::Error::new(ErrorKind::TimedOut, "Mock timeout"));
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break,  // Stop at timeout marker
            }
        }

        Ok(bytes_read)
    }

    fn reset_buffers(&mut self) -> std::io::Result<()> {
        self.record.lock().unwrap().resets += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.record.lock().unwrap().closed = true;
    }
}

#[cfg(test)]
impl Drop for MockLink {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockLink dropped with {} unconsumed responses (read {} of {})",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );
    }
}
