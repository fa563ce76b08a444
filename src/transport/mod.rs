// src/transport/mod.rs

//! The three ways of reaching a station: a text report file written by
//! another program, the LOOP protocol on a serial port, and the same protocol
//! over TCP (a serial-to-network bridge).

pub mod clock;
pub mod file;
pub mod loop_protocol;
pub mod probe;
pub mod serial;
pub mod socket;

use crate::common::{
    error::ProtocolError,
    types::{DataSource, LoopPacket, SensorSnapshot},
};
use chrono::{DateTime, Utc};
use std::io;

pub use file::FileTransport;
pub use serial::SerialTransport;
pub use socket::SocketTransport;

/// Errors raised by a transport while opening, talking to, or closing a station.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Missing or malformed connection parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The port, socket or file could not be opened.
    #[error("Connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The console misbehaved on the wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolError<io::Error>),

    /// The report file could not be read.
    #[error("Report read failed: {0}")]
    Report(#[source] io::Error),

    /// An operation was attempted before `open`.
    #[error("Transport is not open")]
    NotOpen,

    /// The transport has no such operation (e.g. LOOP requests on a file).
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

/// A complete set of readings taken from a text report.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub values: SensorSnapshot,
    /// When the report says the readings were taken.
    pub observed_at: DateTime<Utc>,
}

/// Outcome of polling a report file.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportPoll {
    /// File not modified since the last read.
    Unchanged,
    Fresh(Report),
}

/// One way of reaching a station.
///
/// Wire transports implement the wakeup / identify / LOOP sequence and leave
/// [`Transport::read_report`] alone; the report file transport answers
/// `read_report` and rejects the wire operations.
pub trait Transport: Send {
    fn data_source(&self) -> DataSource;

    /// Acquires the underlying port, socket or file handle.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Wakes the console from its power-save sleep.
    fn wakeup(&mut self) -> Result<(), TransportError>;

    /// Returns the station model name.
    fn identify(&mut self) -> Result<String, TransportError>;

    /// Reads one raw LOOP packet. The CRC is not checked here.
    fn fetch_loop_packet(&mut self) -> Result<LoopPacket, TransportError>;

    /// Releases the handle. Safe to call when not open.
    fn close(&mut self);

    /// Polls a text report, `None` for transports that speak the wire protocol.
    fn read_report(&mut self) -> Option<Result<ReportPoll, TransportError>> {
        None
    }
}
