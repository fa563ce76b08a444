// src/common/packet.rs

use super::error::PacketError;
use super::types::{keys, SensorSnapshot, LOOP_PACKET_LEN};
use super::units;

// Field offsets inside a LOOP-1 packet.
const OFFSET_BAROMETER: usize = 7;
const OFFSET_OUTSIDE_TEMP: usize = 12;
const OFFSET_WIND_SPEED: usize = 14;
const OFFSET_WIND_DIR: usize = 16;
const OFFSET_WIND_GUST: usize = 22;
const OFFSET_OUTSIDE_HUMIDITY: usize = 33;
const OFFSET_RAIN_RATE: usize = 41;
const OFFSET_CRC: usize = 97;

/// Reads a Vantage Pro two-byte value, transmitted LSB first. `buf` must
/// hold at least `offset + 2` bytes; callers check the frame first.
#[inline]
fn vantage_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Physical readings decoded from one LOOP packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopReading {
    /// °C
    pub outside_temp: f64,
    /// %
    pub outside_humidity: f64,
    /// °C
    pub outside_dew_point: f64,
    /// hPa
    pub barometer: f64,
    /// m/s
    pub wind_speed: f64,
    /// Degrees, as received.
    pub wind_dir: u16,
    /// m/s
    pub wind_gust: f64,
    /// Device units, as received.
    pub rain_rate: u16,
}

impl LoopReading {
    /// Formats every field as a decimal string under its published key.
    pub fn to_snapshot(&self) -> SensorSnapshot {
        let mut snapshot = SensorSnapshot::with_capacity(8);
        snapshot.insert(keys::OUTSIDE_TEMP.to_string(), self.outside_temp.to_string());
        snapshot.insert(keys::WIND_SPEED.to_string(), self.wind_speed.to_string());
        snapshot.insert(keys::WIND_DIR.to_string(), self.wind_dir.to_string());
        snapshot.insert(keys::WIND_GUST.to_string(), self.wind_gust.to_string());
        snapshot.insert(keys::OUTSIDE_HUMIDITY.to_string(), self.outside_humidity.to_string());
        snapshot.insert(keys::BAROMETER.to_string(), self.barometer.to_string());
        snapshot.insert(keys::OUTSIDE_DEW_PT.to_string(), self.outside_dew_point.to_string());
        snapshot.insert(keys::RAIN_RATE.to_string(), self.rain_rate.to_string());
        snapshot
    }
}

/// Checks the fixed header and trailer markers of a LOOP-1 packet.
///
/// `L O O` at [0..3], packet type 0 at [4] (LOOP-2 packets carry 1 there and are
/// rejected), `\n\r` at [95..97].
pub fn check_frame(buf: &[u8]) -> Result<(), PacketError> {
    if buf.len() < LOOP_PACKET_LEN {
        return Err(PacketError::TooShort { len: buf.len() });
    }
    if &buf[0..3] != b"LOO" || buf[4] != 0 || buf[95] != b'\n' || buf[96] != b'\r' {
        return Err(PacketError::BadHeaderOrTrailer {
            h0: buf[0],
            h1: buf[1],
            h2: buf[2],
            kind: buf[4],
            t0: buf[95],
            t1: buf[96],
        });
    }
    Ok(())
}

/// Decodes the fields of a LOOP-1 packet and converts them to metric units.
///
/// The CRC is *not* checked here; callers validate it first.
pub fn decode(buf: &[u8]) -> Result<LoopReading, PacketError> {
    check_frame(buf)?;

    let temp_f = f64::from(vantage_u16(buf, OFFSET_OUTSIDE_TEMP)) / 10.0;
    let humidity = f64::from(buf[OFFSET_OUTSIDE_HUMIDITY]);
    // Gust field is in tenths, the driver scales it back up before converting.
    let gust_mph = f64::from(vantage_u16(buf, OFFSET_WIND_GUST)) * 10.0;
    // Barometer is inHg * 1000.
    let barometer_raw = f64::from(vantage_u16(buf, OFFSET_BAROMETER));

    Ok(LoopReading {
        outside_temp: units::fahrenheit_to_celsius(temp_f),
        outside_humidity: humidity,
        outside_dew_point: units::dew_point_celsius(temp_f, humidity),
        barometer: units::inhg_to_hpa(barometer_raw) / 1000.0,
        wind_speed: units::mph_to_mps(f64::from(buf[OFFSET_WIND_SPEED])),
        wind_dir: vantage_u16(buf, OFFSET_WIND_DIR),
        wind_gust: units::mph_to_mps(gust_mph),
        rain_rate: vantage_u16(buf, OFFSET_RAIN_RATE),
    })
}

/// Parses a LOOP-1 packet into a sensor snapshot with all seven readings.
pub fn parse(buf: &[u8]) -> Result<SensorSnapshot, PacketError> {
    decode(buf).map(|reading| reading.to_snapshot())
}

/// The CRC the console appended, for trace output.
pub fn transmitted_crc(buf: &[u8]) -> Option<u16> {
    if buf.len() < LOOP_PACKET_LEN {
        return None;
    }
    Some(u16::from_be_bytes([buf[OFFSET_CRC], buf[OFFSET_CRC + 1]]))
}

/// Space separated upper-case hex dump, used in debug traces.
pub fn hex_dump(buf: &[u8]) -> String {
    buf.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
