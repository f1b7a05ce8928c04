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

// Host-side sender for the serial file transfer protocol
mod config;
mod engine;
mod error;
mod frame;
mod link;
mod logging;
mod progress;
mod protocol;
#[cfg(test)]
mod receiver;
mod source;

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use tracing::info;
use config::{SerialSettings, TransferConfig};
use error::TransferError;
use link::SerialLink;
use progress::{ConsoleProgress, NoProgress, ProgressSink};
use source::FileSource;

#[derive(Parser)]
#[command(name = "transfer")]
#[command(about = "Send a file to the device over a serial link", long_about = None)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyACM0 or COM3)
    port: String,

    /// File to send
    file: PathBuf,

    /// Baud rate
    #[arg(short, long, default_value_t = protocol::DEFAULT_BAUD)]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS")]
    stop_bits: u8,

    /// Seconds given to start the receiver on the device
    #[arg(long, default_value = "5", value_name = "SECS")]
    grace: u64,

    /// Delay in milliseconds after opening the port
    #[arg(long, default_value = "1000", value_name = "MS")]
    settle: u64,

    /// Seconds to wait for each response from the device
    #[arg(long, default_value = "5", value_name = "SECS")]
    timeout: u64,

    /// Attempts per chunk before giving up
    #[arg(long, default_value = "3", value_name = "N")]
    retries: u32,

    /// Suppress the progress line
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

fn fail(message: impl Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn serial_settings(cli: &Cli) -> Result<SerialSettings, error::ConfigError> {
    let mut settings = SerialSettings::new(cli.port.clone());
    settings.baud = cli.baud;
    settings.data_bits = config::parse_data_bits(cli.data_bits)?;
    settings.parity = config::parse_parity(&cli.parity)?;
    settings.stop_bits = config::parse_stop_bits(cli.stop_bits)?;
    settings.settle_delay = Duration::from_millis(cli.settle);
    Ok(settings)
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let settings = serial_settings(&cli).unwrap_or_else(|e| fail(e));
    let config = TransferConfig::new(
        cli.retries,
        Duration::from_secs(cli.timeout),
        Duration::from_secs(cli.grace),
    )
    .unwrap_or_else(|e| fail(e));

    // Missing files are reported before the port is touched
    let source = FileSource::open(&cli.file).unwrap_or_else(|e| fail(e));

    println!("Sending file: {}", String::from_utf8_lossy(source.filename()));
    println!("Size: {} bytes", source.size());
    println!("Port: {}", settings.port);
    println!(
        "Settings: {} baud, {:?}, {:?}, {:?}",
        settings.baud, settings.data_bits, settings.parity, settings.stop_bits
    );

    let link = SerialLink::open(&settings).unwrap_or_else(|e| {
        fail(TransferError::Open { port: settings.port.clone(), source: e })
    });
    std::thread::sleep(settings.settle_delay);
    info!("serial port opened");

    if !config.grace_period.is_zero() {
        println!(
            "\nIMPORTANT: You have {} seconds to run 'recv' on the device NOW!",
            config.grace_period.as_secs()
        );
    }

    let progress: Box<dyn ProgressSink> = if cli.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(ConsoleProgress)
    };

    match engine::transfer(Box::new(link), source, progress, config) {
        Ok(report) => {
            println!();
            if !report.final_ack {
                println!("Warning: No final ACK received");
            }
            println!(
                "Sent {}/{} bytes in {} chunks ({} retries)",
                report.bytes_sent, report.total, report.chunks, report.retries
            );
            println!("\nTransfer completed successfully!");
        }
        Err(e) => {
            println!();
            if e.is_link_error() {
                eprintln!("Check that {} is the device's serial port", settings.port);
            }
            fail(format!("Transfer failed: {}", e));
        }
    }
}
