// src/station/mod.rs

//! Observing-conditions view of a station: named physical properties read
//! from the [`SensorStore`] that a [`Fetcher`] keeps current.

use crate::common::types::{keys, DataSource, OpMode};
use crate::config::{ConfigError, StationConfig};
use crate::fetcher::{FetchError, Fetcher};
use crate::store::SensorStore;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub const DRIVER_NAME: &str = "VantagePro";
pub const VENDOR: &str = "DavisInstruments";
pub const MODEL: &str = "VantagePro2";
pub const OCH_TAG: &str = "Wise40.VantagePro2";

pub const ACTION_RAW_DATA: &str = "raw-data";
pub const ACTION_OCH_TAG: &str = "OCHTag";
pub const ACTION_FORECAST: &str = "forecast";

const SUPPORTED_ACTIONS: [&str; 3] = [ACTION_RAW_DATA, ACTION_OCH_TAG, ACTION_FORECAST];

/// Properties this station measures.
const MEASURED: [&str; 8] = [
    "DewPoint",
    "Humidity",
    "Pressure",
    "Temperature",
    "WindDirection",
    "WindSpeed",
    "WindGust",
    "RainRate",
];

/// Properties of the observing-conditions interface a weather station has no
/// sensor for.
const UNMEASURED: [&str; 5] = [
    "CloudCover",
    "SkyBrightness",
    "SkyQuality",
    "StarFWHM",
    "SkyTemperature",
];

/// A property value, or the signal that the station does not provide it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Value(f64),
    NotImplemented,
}

impl Measurement {
    pub fn value(self) -> Option<f64> {
        match self {
            Measurement::Value(v) => Some(v),
            Measurement::NotImplemented => None,
        }
    }

    pub fn is_implemented(self) -> bool {
        matches!(self, Measurement::Value(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("Not connected")]
    NotConnected,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Action {0} is not implemented by this driver")]
    ActionNotImplemented(String),

    #[error("{0} is not implemented")]
    MethodNotImplemented(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot start the fetcher: {0}")]
    Start(#[from] io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Cannot serialize raw data: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RawData<'a> {
    name: &'a str,
    vendor: &'a str,
    model: &'a str,
    sensor_data: BTreeMap<String, String>,
}

/// One weather station: its configuration, its readings, and (while
/// connected) the fetcher keeping them fresh.
pub struct StationFacade {
    config: StationConfig,
    store: Arc<SensorStore>,
    fetcher: Option<Fetcher>,
    /// Mode whose readings the store currently holds.
    store_mode: Option<OpMode>,
}

impl StationFacade {
    pub fn new(config: StationConfig) -> Self {
        StationFacade {
            config,
            store: Arc::new(SensorStore::new()),
            fetcher: None,
            store_mode: None,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SensorStore> {
        &self.store
    }

    pub fn description(&self) -> String {
        format!("VantagePro2 weather station {}", env!("CARGO_PKG_VERSION"))
    }

    pub fn driver_info(&self) -> String {
        format!(
            "VantagePro2 Report File, Serial Port or Socket driver, {}",
            env!("CARGO_PKG_VERSION")
        )
    }

    // --- Connection ---

    pub fn is_connected(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Validates the configuration, builds the transport and starts fetching.
    ///
    /// Readings from a previous connection survive unless the operation mode
    /// changed in between.
    pub fn connect(&mut self) -> Result<(), StationError> {
        if self.is_connected() {
            return Ok(());
        }

        let transport = self.config.build_transport().map_err(|e| {
            error!("Cannot connect: {}", e);
            e
        })?;

        if self.store_mode != Some(self.config.mode) {
            self.store.clear();
            self.store_mode = Some(self.config.mode);
        }

        let fetcher = Fetcher::new(transport, Arc::clone(&self.store), self.config.interval);
        fetcher.start()?;
        info!("Connected to {}", fetcher.data_source());
        self.fetcher = Some(fetcher);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(fetcher) = self.fetcher.take() {
            fetcher.stop();
            info!("Disconnected from {}", fetcher.data_source());
        }
    }

    /// Replaces the configuration, reconnecting if currently connected.
    pub fn set_config(&mut self, config: StationConfig) -> Result<(), StationError> {
        if config == self.config {
            return Ok(());
        }
        let was_connected = self.is_connected();
        self.disconnect();
        if config.mode != self.config.mode {
            info!("Operation mode {} -> {}", self.config.mode, config.mode);
        }
        self.config = config;
        if was_connected {
            self.connect()?;
        }
        Ok(())
    }

    pub fn data_source(&self) -> Option<DataSource> {
        self.fetcher.as_ref().map(|f| f.data_source().clone())
    }

    /// Runs a fetch cycle now instead of waiting for the timer.
    pub fn refresh(&self) -> Result<bool, StationError> {
        let fetcher = self.fetcher.as_ref().ok_or(StationError::NotConnected)?;
        Ok(fetcher.fetch_once()?)
    }

    /// Blocks until the fetcher publishes new readings or `timeout` passes.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        match &self.fetcher {
            Some(fetcher) => fetcher.wait_for_update(timeout),
            None => false,
        }
    }

    // --- Identity ---

    pub fn station_name(&self) -> String {
        self.store
            .get(keys::STATION_NAME)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn station_model(&self) -> String {
        self.fetcher
            .as_ref()
            .and_then(Fetcher::station_model)
            .or_else(|| self.store.get(keys::STATION_MODEL))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    // --- Measurements ---

    fn reading(&self, key: &str) -> Measurement {
        match self.store.get(key) {
            Some(raw) => Measurement::Value(parse_reading(key, &raw)),
            None => Measurement::NotImplemented,
        }
    }

    /// °C
    pub fn temperature(&self) -> Measurement {
        self.reading(keys::OUTSIDE_TEMP)
    }

    /// %
    pub fn humidity(&self) -> Measurement {
        self.reading(keys::OUTSIDE_HUMIDITY)
    }

    /// hPa
    pub fn pressure(&self) -> Measurement {
        self.reading(keys::BAROMETER)
    }

    /// °C
    pub fn dew_point(&self) -> Measurement {
        self.reading(keys::OUTSIDE_DEW_PT)
    }

    pub fn rain_rate(&self) -> Measurement {
        self.reading(keys::RAIN_RATE)
    }

    /// m/s
    pub fn wind_speed(&self) -> Measurement {
        self.reading(keys::WIND_SPEED)
    }

    /// m/s
    pub fn wind_gust(&self) -> Measurement {
        self.reading(keys::WIND_GUST)
    }

    /// Degrees, 0 when there is no wind.
    pub fn wind_direction(&self) -> Measurement {
        self.store.read_with(|values| {
            let present = |key: &str| values.get(key).filter(|v| !v.is_empty());
            let Some(direction) = present(keys::WIND_DIR) else {
                return Measurement::NotImplemented;
            };
            let calm = present(keys::WIND_SPEED)
                .map(|speed| parse_reading(keys::WIND_SPEED, speed) == 0.0)
                .unwrap_or(false);
            if calm {
                Measurement::Value(0.0)
            } else {
                Measurement::Value(parse_reading(keys::WIND_DIR, direction))
            }
        })
    }

    pub fn cloud_cover(&self) -> Measurement {
        Measurement::NotImplemented
    }

    pub fn sky_brightness(&self) -> Measurement {
        Measurement::NotImplemented
    }

    pub fn sky_quality(&self) -> Measurement {
        Measurement::NotImplemented
    }

    pub fn star_fwhm(&self) -> Measurement {
        Measurement::NotImplemented
    }

    pub fn sky_temperature(&self) -> Measurement {
        Measurement::NotImplemented
    }

    /// Only immediate values are available.
    pub fn average_period(&self) -> f64 {
        0.0
    }

    pub fn set_average_period(&self, hours: f64) -> Result<(), StationError> {
        if hours != 0.0 {
            return Err(StationError::InvalidValue(format!(
                "AveragePeriod {}: only 0.0 accepted",
                hours
            )));
        }
        Ok(())
    }

    pub fn sensor_description(&self, property: &str) -> Result<String, StationError> {
        if property == "AveragePeriod" {
            return Ok("Average period in hours, immediate values are only available".to_string());
        }
        if MEASURED.contains(&property) {
            return Ok(format!("SensorDescription - {}", property));
        }
        if UNMEASURED.contains(&property) {
            return Err(StationError::MethodNotImplemented(format!(
                "SensorDescription({})",
                property
            )));
        }
        Err(StationError::InvalidValue(format!("SensorDescription({})", property)))
    }

    /// Seconds since the last readings, `-1` if none have arrived. An empty
    /// `property` asks about the station as a whole.
    pub fn time_since_last_update(&self, property: &str) -> Result<f64, StationError> {
        if UNMEASURED.contains(&property) {
            return Err(StationError::MethodNotImplemented(format!(
                "TimeSinceLastUpdate({})",
                property
            )));
        }
        if !property.is_empty() && !MEASURED.contains(&property) {
            return Err(StationError::InvalidValue(format!(
                "TimeSinceLastUpdate({})",
                property
            )));
        }
        Ok(self
            .fetcher
            .as_ref()
            .map_or(-1, Fetcher::time_since_last_update) as f64)
    }

    // --- Actions ---

    pub fn supported_actions(&self) -> &'static [&'static str] {
        &SUPPORTED_ACTIONS
    }

    pub fn action(&self, name: &str, _parameter: &str) -> Result<String, StationError> {
        match name {
            ACTION_OCH_TAG => Ok(OCH_TAG.to_string()),
            ACTION_RAW_DATA => self.raw_data(),
            ACTION_FORECAST => self.forecast(),
            other => Err(StationError::ActionNotImplemented(other.to_string())),
        }
    }

    /// The console's forecast text. Only report files carry one.
    pub fn forecast(&self) -> Result<String, StationError> {
        self.store
            .get(keys::FORECAST_STR)
            .ok_or_else(|| StationError::MethodNotImplemented("Forecast".to_string()))
    }

    /// Every published reading as JSON: `{"Name", "Vendor", "Model", "SensorData"}`.
    pub fn raw_data(&self) -> Result<String, StationError> {
        let raw = RawData {
            name: DRIVER_NAME,
            vendor: VENDOR,
            model: MODEL,
            sensor_data: self.store.get_all().into_iter().collect(),
        };
        Ok(serde_json::to_string(&raw)?)
    }
}

impl Drop for StationFacade {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn parse_reading(key: &str, raw: &str) -> f64 {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("Cannot parse {} value '{}'", key, raw);
        f64::NAN
    })
}
