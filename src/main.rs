// src/main.rs

use log::{error, info, warn};
use vantagepro::{Measurement, StationConfig, StationFacade};

fn show(label: &str, measurement: Measurement, unit: &str) {
    match measurement {
        Measurement::Value(v) => info!("  {}: {:.2}{}", label, v, unit),
        Measurement::NotImplemented => info!("  {}: n/a", label),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging, RUST_LOG overrides the Info default
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match StationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let patience = config.interval * 2;

    let mut station = StationFacade::new(config);
    if let Err(e) = station.connect() {
        error!("Failed to connect: {}", e);
        return Err(e.into());
    }
    info!("{}", station.driver_info());

    loop {
        if !station.wait_for_update(patience) {
            let age = station.time_since_last_update("").unwrap_or(-1.0);
            if age < 0.0 {
                warn!("No readings received yet");
            } else {
                warn!("No new readings, last update {} seconds ago", age);
            }
            continue;
        }

        info!("{} ({})", station.station_name(), station.station_model());
        show("Temperature", station.temperature(), " °C");
        show("Humidity", station.humidity(), " %");
        show("Dew point", station.dew_point(), " °C");
        show("Pressure", station.pressure(), " hPa");
        show("Wind speed", station.wind_speed(), " m/s");
        show("Wind direction", station.wind_direction(), "°");
        show("Wind gust", station.wind_gust(), " m/s");
        show("Rain rate", station.rain_rate(), "");
    }
}
