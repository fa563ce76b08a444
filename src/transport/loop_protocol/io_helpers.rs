// src/transport/loop_protocol/io_helpers.rs

use super::LoopProtocol;
use crate::common::{
    error::ProtocolError,
    hal_traits::{StationSerial, StationTimer},
    timing,
};
use arrayvec::ArrayVec;
use core::time::Duration;
use nb::Result as NbResult;

// Implementation block for I/O related helpers
impl<IF> LoopProtocol<IF>
where
    IF: StationSerial + StationTimer,
{
    /// Executes a non-blocking I/O operation (`f`) repeatedly until it
    /// stops returning `WouldBlock`, returning the final result or a timeout error.
    pub(super) fn execute_blocking_io_with_timeout<FN, T>(
        &mut self,
        timeout: Duration,
        mut f: FN,
    ) -> Result<T, ProtocolError<IF::Error>>
    where
        FN: FnMut(&mut IF) -> NbResult<T, IF::Error>,
    {
        let deadline = self.interface.now() + timeout;

        loop {
            match f(&mut self.interface) {
                Ok(result) => return Ok(result),
                Err(nb::Error::WouldBlock) => {
                    if self.interface.now() >= deadline {
                        return Err(ProtocolError::Timeout);
                    }
                    self.interface.delay_ms(timing::POLL_INTERVAL.as_millis() as u32);
                }
                Err(nb::Error::Other(e)) => return Err(ProtocolError::Io(e)),
            }
        }
    }

    /// Reads one byte, waiting at most [`timing::READ_TIMEOUT`].
    pub(super) fn read_byte_with_timeout(&mut self) -> Result<u8, ProtocolError<IF::Error>> {
        self.execute_blocking_io_with_timeout(timing::READ_TIMEOUT, |iface| iface.read_byte())
    }

    /// Fills `buffer` completely. A timeout part way through is a short read.
    pub(super) fn read_exact(&mut self, buffer: &mut [u8]) -> Result<(), ProtocolError<IF::Error>> {
        for got in 0..buffer.len() {
            match self.read_byte_with_timeout() {
                Ok(byte) => buffer[got] = byte,
                Err(ProtocolError::Timeout) => {
                    return Err(ProtocolError::ShortRead {
                        expected: buffer.len(),
                        got,
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads up to `N` bytes, stopping early at the first timeout.
    pub(super) fn read_up_to<const N: usize>(
        &mut self,
    ) -> Result<ArrayVec<u8, N>, ProtocolError<IF::Error>> {
        let mut reply = ArrayVec::new();
        while !reply.is_full() {
            match self.read_byte_with_timeout() {
                Ok(byte) => reply.push(byte),
                Err(ProtocolError::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(reply)
    }

    /// Drops stale input, then writes and flushes a command.
    pub(super) fn send_command(&mut self, bytes: &[u8]) -> Result<(), ProtocolError<IF::Error>> {
        self.interface.discard_input().map_err(ProtocolError::Io)?;
        self.interface.write_all(bytes).map_err(ProtocolError::Io)?;
        self.interface.flush().map_err(ProtocolError::Io)?;
        Ok(())
    }
}

// --- Unit Tests for IO Helpers ---
#[cfg(test)]
mod tests {
    use super::super::test_support::{MockCommError, MockInterface};
    use super::*;

    #[test]
    fn test_execute_blocking_io_with_timeout() {
        let mut protocol = LoopProtocol::new(MockInterface::new(), "[mock]");

        // Ok after a few WouldBlocks
        let mut calls = 0;
        let result_ok: Result<i32, _> =
            protocol.execute_blocking_io_with_timeout(Duration::from_millis(10), |_| {
                calls += 1;
                if calls < 4 {
                    Err(nb::Error::WouldBlock)
                } else {
                    Ok(123)
                }
            });
        assert_eq!(result_ok.unwrap(), 123);
        assert_eq!(calls, 4);

        // Timeout path
        let start = protocol.interface.now_ms;
        let result_timeout: Result<(), _> = protocol
            .execute_blocking_io_with_timeout(Duration::from_millis(5), |_| Err(nb::Error::WouldBlock));
        assert!(matches!(result_timeout, Err(ProtocolError::Timeout)));
        assert!(protocol.interface.now_ms - start >= 5);

        // IO error path
        let result_io: Result<(), _> = protocol
            .execute_blocking_io_with_timeout(Duration::from_millis(10), |_| {
                Err(nb::Error::Other(MockCommError))
            });
        assert!(matches!(result_io, Err(ProtocolError::Io(MockCommError))));
    }

    #[test]
    fn test_read_exact_success() {
        let mut mock_if = MockInterface::new();
        mock_if.stage_read_data(b"\x06LOO");
        let mut protocol = LoopProtocol::new(mock_if, "[mock]");
        let mut buffer = [0u8; 4];
        protocol.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"\x06LOO");
    }

    #[test]
    fn test_read_exact_short() {
        let mut mock_if = MockInterface::new();
        mock_if.stage_read_data(b"LO");
        let mut protocol = LoopProtocol::new(mock_if, "[mock]");
        let mut buffer = [0u8; 5];
        let result = protocol.read_exact(&mut buffer);
        assert!(matches!(result, Err(ProtocolError::ShortRead { expected: 5, got: 2 })));
    }

    #[test]
    fn test_read_up_to_stops_at_timeout() {
        let mut mock_if = MockInterface::new();
        mock_if.stage_read_data(b"\x06");
        let mut protocol = LoopProtocol::new(mock_if, "[mock]");
        let reply = protocol.read_up_to::<2>().unwrap();
        assert_eq!(reply.as_slice(), &[0x06]);
    }

    #[test]
    fn test_read_up_to_leaves_extra_bytes() {
        let mut mock_if = MockInterface::new();
        mock_if.stage_read_data(b"\x06\x10\x99");
        let mut protocol = LoopProtocol::new(mock_if, "[mock]");
        let reply = protocol.read_up_to::<2>().unwrap();
        assert_eq!(reply.as_slice(), &[0x06, 0x10]);
        assert_eq!(protocol.interface.pending(), 1);
    }

    #[test]
    fn test_send_command_discards_then_writes() {
        let mut mock_if = MockInterface::new();
        mock_if.stage_read_data(b"stale");
        let mut protocol = LoopProtocol::new(mock_if, "[mock]");
        protocol.send_command(b"LOOP 1\n").unwrap();
        assert_eq!(protocol.interface.pending(), 0);
        assert_eq!(protocol.interface.written(), b"LOOP 1\n");
        assert_eq!(protocol.interface.flushes, 1);
    }
}
