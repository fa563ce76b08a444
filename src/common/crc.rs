// src/common/crc.rs

use crc::{Algorithm, Crc};

/// CRC algorithm used by the Vantage Pro console for LOOP packets (CRC-16/CCITT,
/// the XMODEM parameterisation).
/// Polynomial: 0x1021
/// Initial Value: 0x0000
/// Input Reflected: false
/// Output Reflected: false
/// Final XOR: 0x0000
/// Check Value: 0x31C3 (for "123456789")
/// Residue: 0x0000
///
/// The console transmits the CRC MSB first, so running the algorithm over a
/// whole packet *including* its trailing CRC bytes leaves a zero register.
pub const VANTAGE_CRC: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0x0000,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0x31C3,
    residue: 0x0000,
};

// Table-driven (256 entries) instance, built at compile time.
const CRC_COMPUTER: Crc<u16> = Crc::<u16>::new(&VANTAGE_CRC);

/// Calculates the CRC-16/CCITT of `data`.
///
/// Equivalent to folding every byte with
/// `crc = table[(crc >> 8) ^ byte] ^ (crc << 8)` starting from zero.
#[inline]
pub fn calculate_crc16(data: &[u8]) -> u16 {
    CRC_COMPUTER.checksum(data)
}

/// Encodes a CRC value the way the console appends it to a packet (MSB first).
pub fn encode_crc(crc_value: u16) -> [u8; 2] {
    crc_value.to_be_bytes()
}

/// Validates a buffer whose last two bytes are the transmitted CRC.
///
/// The buffer is valid iff the running CRC over *all* bytes is zero.
/// Buffers too short to carry a CRC never validate.
///
/// # Arguments
///
/// * `buffer`: The complete packet, CRC included.
///
/// # Returns
///
/// `true` if the packet passes the check.
pub fn validate(buffer: &[u8]) -> bool {
    if buffer.len() < 2 {
        return false;
    }
    calculate_crc16(buffer) == 0
}
