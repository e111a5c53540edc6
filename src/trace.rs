//! The packet trace line (`spec.md` §6's "Log stream") and a small
//! `log::Log` installed by each binary for internal diagnostics.
//!
//! These are kept separate on purpose: the trace line has a wire-stable
//! format external tooling may parse, while the `log` facade is free-form
//! and only ever goes to stderr.

use std::net::SocketAddr;

use chrono::Local;

use crate::packet::Header;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// Print one trace line for `header`, in the exact format from `spec.md` §6:
/// `<HH:MM:SS> <s|r> <local_ip>:<local_port> <peer_ip>:<peer_port> <TYPE> <seq-or-ack> <payload-or-window>`
pub fn log_packet(header: &Header, direction: Direction, local: SocketAddr, peer: SocketAddr) {
    let time = Local::now().format("%H:%M:%S");
    let dir = match direction {
        Direction::Sent => 's',
        Direction::Received => 'r',
    };
    let seq_or_ack = if header.is_ack() {
        header.ack_number
    } else {
        header.sequence_number
    };
    let payload_or_window = if header.is_dat() {
        header.payload_size
    } else {
        header.window_size
    };

    println!(
        "{time} {dir} {local} {peer} {} {seq_or_ack} {payload_or_window}",
        header.type_name()
    );
}

/// A minimal `log::Log` implementation for the engine's internal
/// diagnostics (bind failures, dropped out-of-state segments,
/// retransmissions, handshake transitions). Always writes to stderr so
/// it never interleaves with the trace lines on stdout.
pub struct Logger;

impl Logger {
    pub fn install(level: log::LevelFilter) {
        log::set_max_level(level);
        if log::set_logger(&Logger).is_err() {
            // A logger is already installed (e.g. in tests); leave it alone.
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "{} {:5} {}: {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
