// src/transport/socket.rs

use super::clock::StdClock;
use super::loop_protocol::LoopProtocol;
use super::serial::is_transient;
use super::{Transport, TransportError};
use crate::common::{
    hal_traits::{StationSerial, StationTimer},
    timing,
    types::{DataSource, LoopPacket},
};
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

/// Default TCP port of the serial-to-network bridge.
pub const DEFAULT_PORT: u16 = 22222;

/// TCP link to a serial-to-network bridge.
pub struct TcpLink {
    stream: Option<TcpStream>,
    clock: StdClock,
}

impl TcpLink {
    pub fn connect(addr: &SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(addr, timeout)?;
        stream.set_read_timeout(Some(timing::LINK_POLL_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(TcpLink {
            stream: Some(stream),
            clock: StdClock,
        })
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is closed"))
    }
}

impl StationTimer for TcpLink {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms)
    }
}

impl StationSerial for TcpLink {
    type Error = io::Error;

    fn read_byte(&mut self) -> nb::Result<u8, io::Error> {
        let stream = self.stream().map_err(nb::Error::Other)?;
        let mut byte = [0u8; 1];
        match stream.read(&mut byte) {
            Ok(0) => Err(nb::Error::Other(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ))),
            Ok(_) => Ok(byte[0]),
            Err(e) if is_transient(&e) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream()?.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let drained = loop {
            match stream.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if is_transient(&e) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        stream.set_nonblocking(false)?;
        drained
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Peer may already be gone.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// LOOP protocol over TCP.
pub struct SocketTransport {
    address: String,
    port: u16,
    connect_attempts: usize,
    protocol: Option<LoopProtocol<TcpLink>>,
}

impl SocketTransport {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        SocketTransport {
            address: address.into(),
            port,
            connect_attempts: timing::CONNECT_ATTEMPTS,
            protocol: None,
        }
    }

    /// Overrides the number of connect attempts made by `open`.
    pub fn with_connect_attempts(mut self, attempts: usize) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    /// `[address:port]`, used as the log tag.
    pub fn source(&self) -> String {
        format!("[{}:{}]", self.address, self.port)
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs: Vec<SocketAddr> = (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(TransportError::Connect)?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Connect(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", self.address),
            )));
        }
        Ok(addrs)
    }

    fn connect_once(addrs: &[SocketAddr]) -> io::Result<TcpLink> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no address to connect to");
        for addr in addrs {
            match TcpLink::connect(addr, timing::CONNECT_TIMEOUT) {
                Ok(link) => return Ok(link),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn protocol(&mut self) -> Result<&mut LoopProtocol<TcpLink>, TransportError> {
        self.protocol.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Transport for SocketTransport {
    fn data_source(&self) -> DataSource {
        DataSource {
            kind: "socket",
            details: self.source(),
        }
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.address.trim().is_empty() {
            return Err(TransportError::Config("Empty IP address".to_string()));
        }
        if self.port == 0 {
            return Err(TransportError::Config("Invalid IP port 0".to_string()));
        }
        if self.protocol.is_some() {
            return Ok(());
        }

        let addrs = self.resolve()?;
        let mut attempt = 1;
        let link = loop {
            match Self::connect_once(&addrs) {
                Ok(link) => break link,
                Err(e) if attempt < self.connect_attempts => {
                    debug!("{}: connect attempt {} failed: {}", self.source(), attempt, e);
                    attempt += 1;
                    thread::sleep(timing::CONNECT_BACKOFF);
                }
                Err(e) => {
                    warn!("{}: could not connect after {} attempts", self.source(), attempt);
                    return Err(TransportError::Connect(e));
                }
            }
        };

        debug!("{}: connected on attempt {}", self.source(), attempt);
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
                info!("{}: socket did not report closed", self.source());
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::packet::test_frames::{loop_packet, Fields};
    use std::net::TcpListener;

    #[test]
    fn test_source_and_data_source() {
        let transport = SocketTransport::new("10.0.0.5", DEFAULT_PORT);
        let ds = transport.data_source();
        assert_eq!(ds.kind, "socket");
        assert_eq!(ds.details, "[10.0.0.5:22222]");
    }

    #[test]
    fn test_config_errors() {
        let mut empty = SocketTransport::new("", DEFAULT_PORT);
        assert!(matches!(empty.open(), Err(TransportError::Config(_))));
        let mut zero = SocketTransport::new("127.0.0.1", 0);
        assert!(matches!(zero.open(), Err(TransportError::Config(_))));
    }

    #[test]
    fn test_full_exchange_with_loopback_station() {
        let (port, server) = test_station::spawn(17, Fields::default());
        let mut transport = SocketTransport::new("127.0.0.1", port);

        transport.open().unwrap();
        transport.wakeup().unwrap();
        assert_eq!(transport.identify().unwrap(), "Vantage Vue");
        let packet = transport.fetch_loop_packet().unwrap();
        assert_eq!(packet, loop_packet(Fields::default()));
        transport.close();

        assert_eq!(server.join().unwrap(), 3);
        assert!(matches!(transport.wakeup(), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_connection_refused_after_retries() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = SocketTransport::new("127.0.0.1", port).with_connect_attempts(2);
        assert!(matches!(transport.open(), Err(TransportError::Connect(_))));
    }
}
