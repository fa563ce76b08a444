// src/common/hal_traits.rs

use core::fmt::Debug;
use core::ops::{Add, Sub};
use core::time::Duration;

/// Instant type produced by a [`StationTimer`].
pub trait StationInstant:
    Copy + Ord + Add<Duration, Output = Self> + Sub<Self, Output = Duration>
{
}

impl<T> StationInstant for T where
    T: Copy + Ord + Add<Duration, Output = T> + Sub<T, Output = Duration>
{
}

/// Clock and delay operations needed by the wire protocol.
///
/// Abstracted so the wakeup backoff and read deadlines can run on simulated
/// time in tests.
pub trait StationTimer {
    type Instant: StationInstant;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Delay for at least the specified number of milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Byte-level link to the console (serial port or TCP socket).
pub trait StationSerial {
    /// Associated error type for communication errors.
    type Error: Debug;

    /// Attempts to read a single byte.
    ///
    /// Returns `Err(nb::Error::WouldBlock)` when no byte is available yet.
    fn read_byte(&mut self) -> nb::Result<u8, Self::Error>;

    /// Writes the whole buffer to the link.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Flushes the transmit side.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Drops any unread input.
    fn discard_input(&mut self) -> Result<(), Self::Error>;

    /// Starts releasing the underlying handle.
    fn close(&mut self);

    /// Whether the underlying handle still reports itself open.
    ///
    /// Some drivers finish closing asynchronously, so this may stay `true`
    /// for a while after [`close`](Self::close).
    fn is_open(&self) -> bool;
}
