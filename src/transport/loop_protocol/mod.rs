// src/transport/loop_protocol/mod.rs

mod io_helpers;

use crate::common::{
    error::ProtocolError,
    hal_traits::{StationSerial, StationTimer},
    packet, timing,
    types::{
        LoopPacket, StationModel, ACK, IDENTIFY_COMMAND, LOOP_COMMAND, LOOP_PACKET_LEN,
        WAKEUP_COMMAND, WAKEUP_REPLY,
    },
};
use log::{debug, warn};

/// The console's command/response protocol over any byte link.
///
/// Shared by the serial and TCP transports; the framing is identical on both.
#[derive(Debug)]
pub struct LoopProtocol<IF>
where
    IF: StationSerial + StationTimer,
{
    interface: IF,
    tag: String,
}

impl<IF> LoopProtocol<IF>
where
    IF: StationSerial + StationTimer,
{
    /// Wraps an open link. `tag` prefixes every log line (e.g. `[COM3:19200]`).
    pub fn new(interface: IF, tag: impl Into<String>) -> Self {
        LoopProtocol {
            interface,
            tag: tag.into(),
        }
    }

    pub fn interface(&self) -> &IF {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut IF {
        &mut self.interface
    }

    // --- Public Blocking Methods ---

    /// Wakes the console: sends `\r` and expects exactly `\n\r` back.
    ///
    /// Up to [`timing::WAKEUP_ATTEMPTS`] probes with [`timing::WAKEUP_BACKOFF`]
    /// between them. Returns the 1-based attempt that succeeded.
    pub fn wakeup(&mut self) -> Result<usize, ProtocolError<IF::Error>> {
        let mut reply = [0u8; 2];

        for attempt in 1..=timing::WAKEUP_ATTEMPTS {
            self.send_command(WAKEUP_COMMAND)?;

            match self.read_exact(&mut reply) {
                Ok(()) if reply == WAKEUP_REPLY => {
                    debug!("{}: wakeup attempt {} succeeded", self.tag, attempt);
                    return Ok(attempt);
                }
                Ok(()) => {
                    debug!(
                        "{}: wakeup attempt {} got [{:02X}] [{:02X}]",
                        self.tag, attempt, reply[0], reply[1]
                    );
                }
                Err(ProtocolError::ShortRead { got, .. }) => {
                    debug!("{}: wakeup attempt {} got {} bytes", self.tag, attempt, got);
                }
                Err(e) => return Err(e),
            }

            if attempt < timing::WAKEUP_ATTEMPTS {
                self.interface.delay_ms(timing::WAKEUP_BACKOFF.as_millis() as u32);
            }
        }

        warn!("{}: failed to wake up after {} attempts", self.tag, timing::WAKEUP_ATTEMPTS);
        Err(ProtocolError::WakeupFailed {
            attempts: timing::WAKEUP_ATTEMPTS,
        })
    }

    /// Asks the console for its station type byte.
    ///
    /// A reply of ACK plus a code outside the model table is *not* an error; the
    /// returned model then prints as `Unknown:<code>`.
    pub fn identify(&mut self) -> Result<StationModel, ProtocolError<IF::Error>> {
        self.send_command(IDENTIFY_COMMAND)?;
        let reply = self.read_up_to::<2>()?;

        if reply.len() < 2 {
            return Err(ProtocolError::ShortRead {
                expected: 2,
                got: reply.len(),
            });
        }
        if reply[0] != ACK {
            return Err(ProtocolError::NotAcknowledged(reply[0]));
        }

        let model = StationModel::from_code(reply[1]);
        debug!("{}: station model {}", self.tag, model);
        Ok(model)
    }

    /// Requests one LOOP packet: `LOOP 1\n`, one ACK byte, then 99 bytes.
    pub fn fetch_loop_packet(&mut self) -> Result<LoopPacket, ProtocolError<IF::Error>> {
        self.send_command(LOOP_COMMAND)?;
        debug!("{}: wrote {:?}", self.tag, String::from_utf8_lossy(LOOP_COMMAND));

        let ack = self.read_byte_with_timeout()?;
        if ack != ACK {
            return Err(ProtocolError::NotAcknowledged(ack));
        }
        debug!("{}: got ACK", self.tag);

        let mut packet = [0u8; LOOP_PACKET_LEN];
        self.read_exact(&mut packet)?;
        debug!("{}: read {} bytes: {}", self.tag, LOOP_PACKET_LEN, packet::hex_dump(&packet));

        Ok(packet)
    }

    /// Closes the link and polls until it reports itself closed.
    ///
    /// Returns `false` if the link still claims to be open after
    /// [`timing::CLOSE_POLL_ATTEMPTS`] polls.
    pub fn shutdown(&mut self) -> bool {
        self.interface.close();
        for _ in 0..timing::CLOSE_POLL_ATTEMPTS {
            if !self.interface.is_open() {
                return true;
            }
            self.interface
                .delay_ms(timing::CLOSE_POLL_INTERVAL.as_millis() as u32);
        }
        let closed = !self.interface.is_open();
        if !closed {
            warn!("{}: link still open after close", self.tag);
        }
        closed
    }
}
