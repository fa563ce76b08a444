// src/config.rs

use crate::common::{timing, types::OpMode};
use crate::transport::{
    file::parse_report, serial, socket, FileTransport, SerialTransport, SocketTransport, Transport,
};
use dotenv::dotenv;
use log::warn;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Profile keys.
pub mod profile_keys {
    pub const OPERATION_MODE: &str = "OperationMode";
    pub const DATA_FILE: &str = "DataFile";
    pub const SERIAL_PORT: &str = "SerialPort";
    pub const SERIAL_SPEED: &str = "SerialSpeed";
    pub const IP_ADDRESS: &str = "IPAddress";
    pub const IP_PORT: &str = "IPPort";
    pub const INTERVAL_SECONDS: &str = "IntervalSeconds";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Empty report file name")]
    EmptyDataFile,

    #[error("Empty serial port name")]
    EmptySerialPort,

    #[error("Empty IP address")]
    EmptyIpAddress,

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persistent key/value settings store.
pub trait Settings {
    /// Stored value for `key`, or `default` when absent.
    fn get_value(&self, key: &str, default: &str) -> String;

    fn write_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// Settings held in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Settings for MemorySettings {
    fn get_value(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn write_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as `key = value` lines, rewritten on every change.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSettings {
    /// Loads `path`; a missing file is an empty profile.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => parse_report(&text).into_iter().collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Ok(FileSettings { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), ConfigError> {
        let body: String = self
            .values
            .iter()
            .map(|(key, value)| format!("{} = {}\n", key, value))
            .collect();
        fs::write(&self.path, body).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Settings for FileSettings {
    fn get_value(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn write_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }
    raw.parse().unwrap_or_else(|_| {
        warn!("Invalid {} '{}', using the default", key, raw);
        default
    })
}

fn parse_strict<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn profile_interval(raw: &str, default: Duration) -> Duration {
    let interval = Duration::from_secs(parse_or(
        profile_keys::INTERVAL_SECONDS,
        raw,
        default.as_secs(),
    ));
    if interval < timing::MIN_INTERVAL {
        warn!(
            "{} must be at least {:?}, using the default",
            profile_keys::INTERVAL_SECONDS,
            timing::MIN_INTERVAL
        );
        return default;
    }
    interval
}

/// How to reach the station and how often to poll it.
#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    pub mode: OpMode,
    pub data_file: PathBuf,
    pub serial_port: String,
    pub serial_speed: u32,
    pub ip_address: String,
    pub ip_port: u16,
    pub interval: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            mode: OpMode::File,
            data_file: PathBuf::new(),
            serial_port: String::new(),
            serial_speed: serial::DEFAULT_SPEED,
            ip_address: String::new(),
            ip_port: socket::DEFAULT_PORT,
            interval: timing::DEFAULT_INTERVAL,
        }
    }
}

impl StationConfig {
    /// Checks that the parameters of the current mode are filled in and that
    /// the interval is at least [`timing::MIN_INTERVAL`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < timing::MIN_INTERVAL {
            return Err(ConfigError::InvalidValue {
                key: profile_keys::INTERVAL_SECONDS.to_string(),
                value: format!("{:?}", self.interval),
            });
        }
        match self.mode {
            OpMode::File if self.data_file.as_os_str().is_empty() => Err(ConfigError::EmptyDataFile),
            OpMode::Serial if self.serial_port.trim().is_empty() => {
                Err(ConfigError::EmptySerialPort)
            }
            OpMode::Socket if self.ip_address.trim().is_empty() => {
                Err(ConfigError::EmptyIpAddress)
            }
            _ => Ok(()),
        }
    }

    /// Builds the transport for the current mode.
    pub fn build_transport(&self) -> Result<Box<dyn Transport>, ConfigError> {
        self.validate()?;
        Ok(match self.mode {
            OpMode::File => Box::new(FileTransport::new(&self.data_file)),
            OpMode::Serial => Box::new(SerialTransport::new(&self.serial_port, self.serial_speed)),
            OpMode::Socket => Box::new(SocketTransport::new(&self.ip_address, self.ip_port)),
        })
    }

    /// Reads a saved profile. Missing keys take defaults; values that do not
    /// parse are logged and replaced by defaults.
    pub fn read_profile(settings: &dyn Settings) -> Self {
        use profile_keys::*;
        let defaults = StationConfig::default();

        StationConfig {
            mode: parse_or(
                OPERATION_MODE,
                &settings.get_value(OPERATION_MODE, ""),
                defaults.mode,
            ),
            data_file: PathBuf::from(settings.get_value(DATA_FILE, "")),
            serial_port: settings.get_value(SERIAL_PORT, ""),
            serial_speed: parse_or(
                SERIAL_SPEED,
                &settings.get_value(SERIAL_SPEED, ""),
                defaults.serial_speed,
            ),
            ip_address: settings.get_value(IP_ADDRESS, ""),
            ip_port: parse_or(IP_PORT, &settings.get_value(IP_PORT, ""), defaults.ip_port),
            interval: profile_interval(&settings.get_value(INTERVAL_SECONDS, ""), defaults.interval),
        }
    }

    pub fn write_profile(&self, settings: &mut dyn Settings) -> Result<(), ConfigError> {
        use profile_keys::*;
        let entries: [(&str, &dyn Display); 7] = [
            (OPERATION_MODE, &self.mode),
            (DATA_FILE, &self.data_file.display()),
            (SERIAL_PORT, &self.serial_port),
            (SERIAL_SPEED, &self.serial_speed),
            (IP_ADDRESS, &self.ip_address),
            (IP_PORT, &self.ip_port),
            (INTERVAL_SECONDS, &self.interval.as_secs()),
        ];
        for (key, value) in entries {
            settings.write_value(key, &value.to_string())?;
        }
        Ok(())
    }

    /// Loads `.env` (if any) and reads the `VANTAGE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`StationConfig::from_env`] over any variable source.
    /// Unlike a saved profile, malformed values here are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = StationConfig::default();

        if let Some(mode) = lookup("VANTAGE_MODE") {
            config.mode = mode.parse().map_err(|_| ConfigError::InvalidValue {
                key: "VANTAGE_MODE".to_string(),
                value: mode.clone(),
            })?;
        }
        if let Some(path) = lookup("VANTAGE_DATA_FILE") {
            config.data_file = PathBuf::from(path);
        }
        if let Some(port) = lookup("VANTAGE_SERIAL_PORT") {
            config.serial_port = port;
        }
        if let Some(speed) = lookup("VANTAGE_SERIAL_SPEED") {
            config.serial_speed = parse_strict("VANTAGE_SERIAL_SPEED", &speed)?;
        }
        if let Some(address) = lookup("VANTAGE_IP_ADDRESS") {
            config.ip_address = address;
        }
        if let Some(port) = lookup("VANTAGE_IP_PORT") {
            config.ip_port = parse_strict("VANTAGE_IP_PORT", &port)?;
        }
        if let Some(secs) = lookup("VANTAGE_INTERVAL_SECS") {
            config.interval = Duration::from_secs(parse_strict("VANTAGE_INTERVAL_SECS", &secs)?);
            if config.interval < timing::MIN_INTERVAL {
                return Err(ConfigError::InvalidValue {
                    key: "VANTAGE_INTERVAL_SECS".to_string(),
                    value: secs,
                });
            }
        }

        Ok(config)
    }
}
