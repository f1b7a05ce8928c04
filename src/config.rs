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

use std::time::Duration;
use serialport::{DataBits, Parity, StopBits};
use crate::error::ConfigError;
use crate::protocol::*;

/// Engine tunables. Defaults are the protocol constants.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Attempts per chunk before giving up
    pub max_retries: u32,
    pub read_timeout: Duration,
    /// Operator-facing delay before the header is sent; may be zero
    pub grace_period: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            max_retries: MAX_RETRIES,
            read_timeout: READ_TIMEOUT,
            grace_period: GRACE_PERIOD,
        }
    }
}

impl TransferConfig {
    pub fn new(max_retries: u32, read_timeout: Duration, grace_period: Duration) -> Result<Self, ConfigError> {
        if max_retries == 0 {
            return Err(ConfigError::Retries);
        }
        Ok(TransferConfig { max_retries, read_timeout, grace_period })
    }
}

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub settle_delay: Duration,
}

impl SerialSettings {
    pub fn new(port: String) -> Self {
        SerialSettings {
            port,
            baud: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            settle_delay: SETTLE_DELAY,
        }
    }
}

pub fn parse_data_bits(bits: u8) -> Result<DataBits, ConfigError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(ConfigError::DataBits(bits)),
    }
}

pub fn parse_parity(parity: &str) -> Result<Parity, ConfigError> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(ConfigError::Parity(parity.to_string())),
    }
}

pub fn parse_stop_bits(bits: u8) -> Result<StopBits, ConfigError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(ConfigError::StopBits(bits)),
    }
}
