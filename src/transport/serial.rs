// src/transport/serial.rs

use super::clock::StdClock;
use super::loop_protocol::LoopProtocol;
use super::{Transport, TransportError};
use crate::common::{
    hal_traits::{StationSerial, StationTimer},
    timing,
    types::{DataSource, LoopPacket},
};
use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Instant;

/// Default console baud rate.
pub const DEFAULT_SPEED: u32 = 19200;

/// Serial port link: a `serialport` handle with a short OS-level read timeout.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    clock: StdClock,
}

impl SerialLink {
    /// Opens `port_name` at `speed` baud, 8N1.
    pub fn open(port_name: &str, speed: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, speed)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(timing::LINK_POLL_TIMEOUT)
            .open()?;
        Ok(SerialLink {
            port: Some(port),
            clock: StdClock,
        })
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

impl StationTimer for SerialLink {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms)
    }
}

impl StationSerial for SerialLink {
    type Error = io::Error;

    fn read_byte(&mut self) -> nb::Result<u8, io::Error> {
        let port = self.port().map_err(nb::Error::Other)?;
        let mut byte = [0u8; 1];
        match port.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(e) if is_transient(&e) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port()?.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port()?.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    // `serialport` releases the handle when the port is dropped, so the link
    // is closed once this returns. The close polling in the protocol only
    // waits on links that close asynchronously.
    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

pub(super) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// LOOP protocol over a local serial port.
pub struct SerialTransport {
    port_name: String,
    speed: u32,
    protocol: Option<LoopProtocol<SerialLink>>,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, speed: u32) -> Self {
        SerialTransport {
            port_name: port_name.into(),
            speed,
            protocol: None,
        }
    }

    /// `[port:speed]`, used as the log tag.
    pub fn source(&self) -> String {
        format!("[{}:{}]", self.port_name, self.speed)
    }

    fn protocol(&mut self) -> Result<&mut LoopProtocol<SerialLink>, TransportError> {
        self.protocol.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Transport for SerialTransport {
    fn data_source(&self) -> DataSource {
        DataSource {
            kind: "serial",
            details: self.source(),
        }
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.port_name.trim().is_empty() {
            return Err(TransportError::Config("Empty serial port name".to_string()));
        }
        if self.protocol.is_some() {
            return Ok(());
        }
        let link = SerialLink::open(&self.port_name, self.speed)
            .map_err(|e| TransportError::Connect(io::Error::from(e)))?;
        debug!("{}: opened", self.source());
        self.protocol = Some(LoopProtocol::new(link, self.source()));
        Ok(())
    }

    fn wakeup(&mut self) -> Result<(), TransportError> {
        self.protocol()?.wakeup()?;
        Ok(())
    }

    fn identify(&mut self) -> Result<String, TransportError> {
        let model = self.protocol()?.identify()?;
        Ok(model.to_string())
    }

    fn fetch_loop_packet(&mut self) -> Result<LoopPacket, TransportError> {
        Ok(self.protocol()?.fetch_loop_packet()?)
    }

    fn close(&mut self) {
        if let Some(mut protocol) = self.protocol.take() {
            if protocol.shutdown() {
                debug!("{}: closed", self.source());
            } else {
                info!("{}: port did not report closed", self.source());
            }
        }
    }
}
