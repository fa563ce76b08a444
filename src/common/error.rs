// src/common/error.rs

/// Errors raised while speaking the console's wire protocol over a byte link.
///
/// Generic over the link's own I/O error so the protocol code can run over a
/// serial port, a TCP socket or a test double alike.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError<E = std::io::Error>
where
    E: core::fmt::Debug,
{
    /// Underlying I/O error from the link.
    #[error("I/O error: {0:?}")]
    Io(E),

    /// No byte arrived within the per-read timeout.
    #[error("Operation timed out")]
    Timeout,

    /// The console never answered the `\r` probe with `\n\r`.
    #[error("Console did not wake up after {attempts} attempts")]
    WakeupFailed { attempts: usize },

    /// A command was answered with something other than ACK.
    #[error("Expected ACK, got {0:#04x}")]
    NotAcknowledged(u8),

    /// The reply ended before the expected number of bytes.
    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

/// Structural problems found in a LOOP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Buffer shorter than a LOOP packet.
    #[error("Packet too short: {len} bytes")]
    TooShort { len: usize },

    /// `LOO` header, LOOP-1 type byte or `\n\r` trailer is wrong.
    #[error(
        "Bad header [0]: {h0:#04x}, [1]: {h1:#04x}, [2]: {h2:#04x}, [4]: {kind:#04x} and/or trailer [95]: {t0:#04x}, [96]: {t1:#04x}"
    )]
    BadHeaderOrTrailer {
        h0: u8,
        h1: u8,
        h2: u8,
        kind: u8,
        t0: u8,
        t1: u8,
    },
}
