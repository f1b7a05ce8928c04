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

//! Host side of the transfer protocol.
//!
//! The session is a typestate machine: each state is a marker type and
//! `step()` consumes the current state, performs one blocking exchange with
//! the device and yields the next state. Only one frame is ever in flight.
//! The link is held by a `LinkGuard`, so it is flushed and closed whenever
//! the machine is dropped, whether the session finished or failed.

use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::frame::{Frame, Response, checksum};
use crate::link::{Link, LinkGuard};
use crate::progress::ProgressSink;
use crate::protocol::*;
use crate::source::FileSource;

// ============================================================================
// States
// ============================================================================

pub struct Idle;
pub struct AwaitingArmed;
pub struct HeaderSent;
pub struct AwaitingHeaderAck;
pub struct Transferring;
pub struct AwaitingChunkAck;
pub struct Ending;
pub struct AwaitingFinalAck;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct TransferFsm<State> {
    state: PhantomData<State>,
    link: LinkGuard,
    source: FileSource,
    progress: Box<dyn ProgressSink>,
    config: TransferConfig,
    chunk: Vec<u8>,
    // Encoded data frame awaiting acknowledgment, resent verbatim on retry
    frame: Vec<u8>,
    bytes_sent: u32,
    chunks: u32,
    retries: u32,
    total_retries: u32,
}

/// Summary of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes_sent: u32,
    pub total: u32,
    pub chunks: u32,
    pub retries: u32,
    /// False when the device did not acknowledge the end marker. The data is
    /// still considered delivered since every chunk was acknowledged.
    pub final_ack: bool,
}

pub enum Step {
    Next(Box<dyn EngineState>),
    Done(TransferReport),
}

// ============================================================================
// Trait
// ============================================================================

pub trait EngineState: Send {
    fn step(self: Box<Self>) -> Result<Step, TransferError>;

    fn state_name(&self) -> &'static str;

    fn bytes_sent(&self) -> u32;

    /// Failed attempts for the chunk currently in flight
    fn retries(&self) -> u32;
}

// ============================================================================
// Helpers
// ============================================================================

impl<S> TransferFsm<S> {
    fn transition<T>(self) -> Box<TransferFsm<T>> {
        Box::new(TransferFsm {
            state: PhantomData,
            link: self.link,
            source: self.source,
            progress: self.progress,
            config: self.config,
            chunk: self.chunk,
            frame: self.frame,
            bytes_sent: self.bytes_sent,
            chunks: self.chunks,
            retries: self.retries,
            total_retries: self.total_retries,
        })
    }

    fn name() -> &'static str {
        let type_name = std::any::type_name::<S>();
        type_name.split("::").last().unwrap_or(type_name)
    }

    fn link_error(e: std::io::Error) -> TransferError {
        TransferError::Link { state: Self::name(), source: e }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        self.link.write_all(bytes).map_err(Self::link_error)?;
        self.link.flush().map_err(Self::link_error)
    }

    /// Writes the pending data frame
    fn send_frame(&mut self) -> Result<(), TransferError> {
        let frame = std::mem::take(&mut self.frame);
        let sent = self.send(&frame);
        self.frame = frame;
        sent
    }

    fn read_response(&mut self) -> Result<Option<u8>, TransferError> {
        let timeout = self.config.read_timeout;
        self.link.read_byte(timeout).map_err(Self::link_error)
    }
}

macro_rules! engine_state {
    ($state:ty) => {
        fn state_name(&self) -> &'static str {
            TransferFsm::<$state>::name()
        }

        fn bytes_sent(&self) -> u32 {
            self.bytes_sent
        }

        fn retries(&self) -> u32 {
            self.retries
        }
    };
}

// ============================================================================
// State Implementations
// ============================================================================

impl EngineState for TransferFsm<Idle> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;
        fsm.link.reset_buffers().map_err(Self::link_error)?;
        debug!("link buffers reset");
        Ok(Step::Next(fsm.transition::<AwaitingArmed>()))
    }

    engine_state!(Idle);
}

impl EngineState for TransferFsm<AwaitingArmed> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let fsm = *self;
        countdown(fsm.config.grace_period);
        Ok(Step::Next(fsm.transition::<HeaderSent>()))
    }

    engine_state!(AwaitingArmed);
}

impl EngineState for TransferFsm<HeaderSent> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;
        let header = Frame::Start {
            filename: fsm.source.filename(),
            file_size: fsm.source.size(),
        }
        .encode();
        fsm.send(&header)?;
        debug!(
            "Sent: START ({:?}, {} bytes)",
            String::from_utf8_lossy(fsm.source.filename()),
            fsm.source.size()
        );
        Ok(Step::Next(fsm.transition::<AwaitingHeaderAck>()))
    }

    engine_state!(HeaderSent);
}

impl EngineState for TransferFsm<AwaitingHeaderAck> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;
        match fsm.read_response()? {
            Some(ACK) => {
                info!("header acknowledged, starting data transfer");
                Ok(Step::Next(fsm.transition::<Transferring>()))
            }
            Some(got) => {
                // Best effort: whatever else the device said helps diagnose it
                let trailing = fsm.link.drain(DRAIN_DELAY, DRAIN_LIMIT).unwrap_or_else(|e| {
                    debug!("drain after header mismatch failed: {}", e);
                    Vec::new()
                });
                Err(TransferError::ProtocolMismatch { got, trailing })
            }
            None => Err(TransferError::Timeout { state: Self::name() }),
        }
    }

    engine_state!(AwaitingHeaderAck);
}

impl EngineState for TransferFsm<Transferring> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;

        let len = fsm.source.next_chunk(&mut fsm.chunk)?;
        if len == 0 {
            debug!("end of file after {} chunks", fsm.chunks);
            return Ok(Step::Next(fsm.transition::<Ending>()));
        }

        fsm.frame = Frame::Data { payload: &fsm.chunk }.encode();
        fsm.send_frame()?;
        debug!(
            "Sent: DATA chunk {} ({} bytes, checksum 0x{:02X})",
            fsm.chunks,
            len,
            checksum(&fsm.chunk)
        );

        Ok(Step::Next(fsm.transition::<AwaitingChunkAck>()))
    }

    engine_state!(Transferring);
}

impl EngineState for TransferFsm<AwaitingChunkAck> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;

        match fsm.read_response()?.map(Response::from) {
            Some(Response::Ack) => {
                fsm.bytes_sent += fsm.chunk.len() as u32;
                fsm.chunks += 1;
                fsm.retries = 0;
                debug!("Received: ACK ({}/{} bytes)", fsm.bytes_sent, fsm.source.size());
                let total = fsm.source.size();
                fsm.progress.chunk_acked(fsm.bytes_sent, total);
                return Ok(Step::Next(fsm.transition::<Transferring>()));
            }
            Some(Response::Nak) => {
                warn!("NAK received, retrying chunk at {}", fsm.bytes_sent);
            }
            Some(Response::Other(byte)) => {
                warn!("unexpected response 0x{:02X}, retrying chunk at {}", byte, fsm.bytes_sent);
            }
            None => {
                warn!("timeout waiting for response, retrying chunk at {}", fsm.bytes_sent);
            }
        }

        fsm.retries += 1;
        fsm.total_retries += 1;
        if fsm.retries >= fsm.config.max_retries {
            return Err(TransferError::MaxRetriesExceeded {
                offset: fsm.bytes_sent,
                attempts: fsm.retries,
            });
        }

        fsm.send_frame()?;
        debug!("Resent: DATA chunk {} (attempt {})", fsm.chunks, fsm.retries + 1);

        Ok(Step::Next(Box::new(fsm)))
    }

    engine_state!(AwaitingChunkAck);
}

impl EngineState for TransferFsm<Ending> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;
        fsm.send(&Frame::End.encode())?;
        debug!("Sent: END");
        Ok(Step::Next(fsm.transition::<AwaitingFinalAck>()))
    }

    engine_state!(Ending);
}

impl EngineState for TransferFsm<AwaitingFinalAck> {
    fn step(self: Box<Self>) -> Result<Step, TransferError> {
        let mut fsm = *self;

        let final_ack = match fsm.read_response()? {
            Some(ACK) => {
                debug!("Received: final ACK");
                true
            }
            Some(byte) => {
                warn!("expected final ACK, got 0x{:02X}", byte);
                false
            }
            None => {
                warn!("no final ACK received");
                false
            }
        };

        let report = TransferReport {
            bytes_sent: fsm.bytes_sent,
            total: fsm.source.size(),
            chunks: fsm.chunks,
            retries: fsm.total_retries,
            final_ack,
        };
        info!(
            "transfer finished: {} bytes in {} chunks, {} retries",
            report.bytes_sent, report.chunks, report.retries
        );
        Ok(Step::Done(report))
    }

    engine_state!(AwaitingFinalAck);
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl TransferFsm<Idle> {
    pub fn new(
        link: Box<dyn Link>,
        source: FileSource,
        progress: Box<dyn ProgressSink>,
        config: TransferConfig,
    ) -> Box<dyn EngineState> {
        Box::new(TransferFsm {
            state: PhantomData::<Idle>,
            link: LinkGuard::new(link),
            source,
            progress,
            config,
            chunk: Vec::with_capacity(CHUNK_SIZE),
            frame: Vec::with_capacity(CHUNK_SIZE + 4),
            bytes_sent: 0,
            chunks: 0,
            retries: 0,
            total_retries: 0,
        })
    }
}

/// Drives a session to completion
pub fn run(mut state: Box<dyn EngineState>) -> Result<TransferReport, TransferError> {
    loop {
        let name = state.state_name();
        let bytes_sent = state.bytes_sent();
        let retries = state.retries();
        match state.step() {
            Ok(Step::Next(next)) => state = next,
            Ok(Step::Done(report)) => return Ok(report),
            Err(e) => {
                debug!(
                    "session aborted in {} after {} bytes ({} retries on current chunk)",
                    name, bytes_sent, retries
                );
                return Err(e);
            }
        }
    }
}

pub fn transfer(
    link: Box<dyn Link>,
    source: FileSource,
    progress: Box<dyn ProgressSink>,
    config: TransferConfig,
) -> Result<TransferReport, TransferError> {
    run(TransferFsm::new(link, source, progress, config))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn countdown(grace: Duration) {
    if grace.is_zero() {
        return;
    }

    let whole = grace.as_secs();
    for remaining in (1..=whole).rev() {
        info!("Starting in {}...", remaining);
        std::thread::sleep(Duration::from_secs(1));
    }

    let rest = grace - Duration::from_secs(whole);
    if !rest.is_zero() {
        std::thread::sleep(rest);
    }
}

// ============================================================================
// Tests
// ============================================================================
