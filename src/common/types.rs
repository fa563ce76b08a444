// src/common/types.rs

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

/// Sensor key to pre-formatted value, as published in the store.
pub type SensorSnapshot = HashMap<String, String>;

// --- Wire constants ---

/// Acknowledgement byte sent by the console after a command.
pub const ACK: u8 = 0x06;
/// Wakeup probe.
pub const WAKEUP_COMMAND: &[u8] = b"\r";
/// Reply to a successful wakeup probe.
pub const WAKEUP_REPLY: &[u8] = b"\n\r";
/// `WRD` 0x12 0x4D: read the station type byte.
pub const IDENTIFY_COMMAND: &[u8] = &[b'W', b'R', b'D', 0x12, 0x4D, b'\n'];
/// Request a single LOOP packet.
pub const LOOP_COMMAND: &[u8] = b"LOOP 1\n";
/// Length of a LOOP packet, header to CRC.
pub const LOOP_PACKET_LEN: usize = 99;

/// Raw LOOP packet as read off the wire.
pub type LoopPacket = [u8; LOOP_PACKET_LEN];

// --- Sensor keys ---

/// Keys under which readings are published.
pub mod keys {
    pub const OUTSIDE_TEMP: &str = "outsideTemp";
    pub const OUTSIDE_HUMIDITY: &str = "outsideHumidity";
    pub const OUTSIDE_DEW_PT: &str = "outsideDewPt";
    pub const BAROMETER: &str = "barometer";
    pub const WIND_SPEED: &str = "windSpeed";
    pub const WIND_DIR: &str = "windDir";
    pub const WIND_GUST: &str = "windGust";
    pub const RAIN_RATE: &str = "rainRate";
    // Text report only.
    pub const UTC_DATE: &str = "utcDate";
    pub const UTC_TIME: &str = "utcTime";
    pub const STATION_NAME: &str = "StationName";
    pub const STATION_MODEL: &str = "stationModel";
    pub const FORECAST_STR: &str = "ForecastStr";
}

// --- Station model ---

/// Station type byte returned by the identify command.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StationModel(u8);

impl StationModel {
    /// Known station type codes and their names.
    pub const KNOWN: [(u8, &'static str); 9] = [
        (0, "Wizard III"),
        (1, "Wizard II"),
        (2, "Monitor"),
        (3, "Perception"),
        (4, "GroWeather"),
        (5, "Energy Enviromonitor"),
        (6, "Health Enviromonitor"),
        (16, "Vantage Pro or Vantage Pro 2"),
        (17, "Vantage Vue"),
    ];

    pub fn from_code(code: u8) -> Self {
        StationModel(code)
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    /// Human-readable name, `None` for codes outside the table.
    pub fn name(&self) -> Option<&'static str> {
        Self::KNOWN
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }

    pub fn is_known(&self) -> bool {
        self.name().is_some()
    }
}

impl fmt::Display for StationModel {
    /// Known models print their name, others the `Unknown:<code>` sentinel.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown:{}", self.0),
        }
    }
}

// --- Operational mode ---

/// Which transport sources the sensor data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OpMode {
    #[default]
    File,
    Serial,
    Socket,
}

impl fmt::Display for OpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpMode::File => f.write_str("File"),
            OpMode::Serial => f.write_str("Serial"),
            OpMode::Socket => f.write_str("Socket"),
        }
    }
}

impl FromStr for OpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(OpMode::File),
            "serial" => Ok(OpMode::Serial),
            "socket" | "ip" | "tcp" => Ok(OpMode::Socket),
            other => Err(format!("unknown operation mode '{}'", other)),
        }
    }
}

// --- Data source descriptor ---

/// Where the readings come from, for display and logging.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataSource {
    /// `"file"`, `"serial"` or `"socket"`.
    pub kind: &'static str,
    /// Transport specific details, e.g. `[COM3:19200]`.
    pub details: String,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.details)
    }
}
