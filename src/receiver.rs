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

//! Device side of the protocol, used to exercise the engine end to end.
//!
//! `Receiver` is fed the host's bytes one at a time and queues its
//! single-byte replies. `LoopbackLink` connects it to the engine in place of
//! a serial port. Faults are keyed by the arrival index of data frames,
//! counting retransmissions.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::frame::checksum;
use crate::link::Link;
use crate::protocol::*;

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    WaitStart,
    FilenameLen,
    Filename { remaining: usize },
    FileSize,
    WaitDataOrEnd,
    ChunkLen,
    Payload { remaining: usize },
    Checksum,
    Finished,
}

/// Injected misbehaviour
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Data frames whose first payload byte is flipped on arrival
    pub corrupt: Vec<usize>,
    /// Data frames that vanish without reaching the device
    pub lost: Vec<usize>,
    /// Reply to the header instead of ACK
    pub header_reply: Option<Vec<u8>>,
}

// ============================================================================
// Receiver
// ============================================================================

pub struct Receiver {
    state: RxState,
    faults: Faults,
    pub filename: Vec<u8>,
    pub file_size: u32,
    pub data: Vec<u8>,
    pub naks: usize,
    pub data_frames: usize,
    field: Vec<u8>,
    payload: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl Receiver {
    pub fn new(faults: Faults) -> Self {
        Receiver {
            state: RxState::WaitStart,
            faults,
            filename: Vec::new(),
            file_size: 0,
            data: Vec::new(),
            naks: 0,
            data_frames: 0,
            field: Vec::new(),
            payload: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    pub fn finished(&self) -> bool {
        self.state == RxState::Finished
    }

    fn reply(&mut self, byte: u8) {
        if byte == NAK {
            self.naks += 1;
        }
        self.outbox.push_back(byte);
    }

    pub fn feed(&mut self, byte: u8) {
        self.state = match self.state {
            RxState::WaitStart if byte == START => RxState::FilenameLen,
            // Line noise before the session starts is ignored
            RxState::WaitStart => RxState::WaitStart,
            RxState::FilenameLen => {
                self.filename.clear();
                if byte == 0 {
                    RxState::FileSize
                } else {
                    RxState::Filename { remaining: byte as usize }
                }
            }
            RxState::Filename { remaining } => {
                self.filename.push(byte);
                if remaining == 1 {
                    RxState::FileSize
                } else {
                    RxState::Filename { remaining: remaining - 1 }
                }
            }
            RxState::FileSize => {
                self.field.push(byte);
                if self.field.len() < 4 {
                    RxState::FileSize
                } else {
                    let size = [self.field[0], self.field[1], self.field[2], self.field[3]];
                    self.file_size = u32::from_le_bytes(size);
                    self.field.clear();
                    match self.faults.header_reply.clone() {
                        Some(reply) => {
                            self.outbox.extend(reply);
                            RxState::Finished
                        }
                        None => {
                            self.reply(ACK);
                            RxState::WaitDataOrEnd
                        }
                    }
                }
            }
            RxState::WaitDataOrEnd if byte == DATA => RxState::ChunkLen,
            RxState::WaitDataOrEnd if byte == END => {
                if self.data.len() == self.file_size as usize {
                    self.reply(ACK);
                } else {
                    self.reply(NAK);
                }
                RxState::Finished
            }
            RxState::WaitDataOrEnd => {
                self.reply(NAK);
                RxState::WaitDataOrEnd
            }
            RxState::ChunkLen => {
                self.field.push(byte);
                if self.field.len() < 2 {
                    RxState::ChunkLen
                } else {
                    let len = u16::from_le_bytes([self.field[0], self.field[1]]) as usize;
                    self.field.clear();
                    self.payload.clear();
                    if len == 0 {
                        RxState::Checksum
                    } else {
                        RxState::Payload { remaining: len }
                    }
                }
            }
            RxState::Payload { remaining } => {
                self.payload.push(byte);
                if remaining == 1 {
                    RxState::Checksum
                } else {
                    RxState::Payload { remaining: remaining - 1 }
                }
            }
            RxState::Checksum => {
                self.verify_chunk(byte);
                RxState::WaitDataOrEnd
            }
            RxState::Finished => RxState::Finished,
        };
    }

    fn verify_chunk(&mut self, received: u8) {
        let index = self.data_frames;
        self.data_frames += 1;

        if self.faults.lost.contains(&index) {
            return;
        }
        if self.faults.corrupt.contains(&index) {
            if let Some(first) = self.payload.first_mut() {
                *first ^= 0xFF;
            }
        }

        if checksum(&self.payload) == received && self.payload.len() <= CHUNK_SIZE {
            self.data.extend_from_slice(&self.payload);
            self.reply(ACK);
        } else {
            self.reply(NAK);
        }
    }
}

// ============================================================================
// Loopback Link
// ============================================================================

pub type SharedReceiver = Arc<Mutex<Receiver>>;

/// Link whose far end is an in-process `Receiver`
pub struct LoopbackLink {
    receiver: SharedReceiver,
}

impl LoopbackLink {
    pub fn new(faults: Faults) -> (Self, SharedReceiver) {
        let receiver = Arc::new(Mutex::new(Receiver::new(faults)));
        (LoopbackLink { receiver: receiver.clone() }, receiver)
    }
}

impl Link for LoopbackLink {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut receiver = self.receiver.lock().unwrap();
        for &byte in buf {
            receiver.feed(byte);
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        let mut receiver = self.receiver.lock().unwrap();
        if receiver.outbox.is_empty() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "Loopback timeout"));
        }

        let mut n = 0;
        while n < buf.len() {
            match receiver.outbox.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn reset_buffers(&mut self) -> std::io::Result<()> {
        self.receiver.lock().unwrap().outbox.clear();
        Ok(())
    }

    fn close(&mut self) {}
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::engine::{TransferReport, transfer};
    use crate::error::TransferError;
    use crate::frame::Frame;
    use crate::progress::NoProgress;
    use crate::source::FileSource;
    use std::io::Cursor;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8 ^ 0x5A).collect()
    }

    fn send(data: &[u8], faults: Faults) -> (Result<TransferReport, TransferError>, SharedReceiver) {
        let (link, receiver) = LoopbackLink::new(faults);
        let source = FileSource::new("level1.bin", data.len() as u64, Cursor::new(data.to_vec())).unwrap();
        let config = TransferConfig::new(MAX_RETRIES, Duration::from_millis(1), Duration::ZERO).unwrap();
        let result = transfer(Box::new(link), source, Box::new(NoProgress), config);
        (result, receiver)
    }

    #[test]
    fn test_receiver_rejects_corrupted_payload() {
        let payload = content(100);
        let mut frame = Frame::Data { payload: &payload }.encode();
        frame[10] ^= 0x01;

        let header = Frame::Start { filename: b"x", file_size: 100 }.encode();
        let mut receiver = Receiver::new(Faults::default());
        for byte in header {
            receiver.feed(byte);
        }
        for byte in frame {
            receiver.feed(byte);
        }
        assert_eq!(receiver.outbox, VecDeque::from(vec![ACK, NAK]));
        assert!(receiver.data.is_empty());
    }

    #[test]
    fn test_loopback_transfer() {
        let data = content(1025);
        let (result, receiver) = send(&data, Faults::default());

        let report = result.unwrap();
        assert!(report.final_ack);
        assert_eq!(report.chunks, 3);

        let receiver = receiver.lock().unwrap();
        assert!(receiver.finished());
        assert_eq!(receiver.filename, b"level1.bin");
        assert_eq!(receiver.file_size, 1025);
        assert_eq!(receiver.data, data);
        assert_eq!(receiver.data_frames, 3);
    }

    #[test]
    fn test_loopback_empty_file() {
        let (result, receiver) = send(&[], Faults::default());
        assert!(result.unwrap().final_ack);

        let receiver = receiver.lock().unwrap();
        assert_eq!(receiver.file_size, 0);
        assert_eq!(receiver.data_frames, 0);
        assert!(receiver.finished());
    }

    #[test]
    fn test_corruption_recovered_by_retransmission() {
        let data = content(1500);
        let faults = Faults { corrupt: vec![1, 2], ..Faults::default() };
        let (result, receiver) = send(&data, faults);

        let report = result.unwrap();
        assert_eq!(report.retries, 2);
        assert!(report.final_ack);

        let receiver = receiver.lock().unwrap();
        assert_eq!(receiver.naks, 2);
        assert_eq!(receiver.data, data);
        assert_eq!(receiver.data_frames, 5);
    }

    #[test]
    fn test_lost_frame_recovered_after_timeout() {
        let data = content(700);
        let faults = Faults { lost: vec![0], ..Faults::default() };
        let (result, receiver) = send(&data, faults);

        assert_eq!(result.unwrap().retries, 1);
        assert_eq!(receiver.lock().unwrap().data, data);
    }

    #[test]
    fn test_persistent_corruption_aborts_session() {
        let data = content(1500);
        let faults = Faults { corrupt: vec![1, 2, 3], ..Faults::default() };
        let (result, receiver) = send(&data, faults);

        match result {
            Err(TransferError::MaxRetriesExceeded { offset, attempts }) => {
                assert_eq!(offset, 512);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected MaxRetriesExceeded, got {:?}", other),
        }

        let receiver = receiver.lock().unwrap();
        assert_eq!(receiver.data, &data[..512]);
        assert!(!receiver.finished());
    }

    #[test]
    fn test_device_not_in_receive_mode() {
        let faults = Faults { header_reply: Some(b"?\r\n> ".to_vec()), ..Faults::default() };
        let (result, receiver) = send(&content(10), faults);

        match result {
            Err(TransferError::ProtocolMismatch { got, trailing }) => {
                assert_eq!(got, b'?');
                assert_eq!(trailing, b"\r\n> ");
            }
            other => panic!("expected ProtocolMismatch, got {:?}", other),
        }
        assert_eq!(receiver.lock().unwrap().data_frames, 0);
    }
}
