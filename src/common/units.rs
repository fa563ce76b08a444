// src/common/units.rs

//! Instrument-unit to SI/metric conversions. All functions are pure.

/// Pressure of one inch of mercury, in hectopascals.
pub const HPA_PER_INHG: f64 = 33.8639;
/// Metres per second in one mile per hour.
pub const MPS_PER_MPH: f64 = 0.44704;
/// Offset between Kelvin and Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn fahrenheit_to_kelvin(f: f64) -> f64 {
    fahrenheit_to_celsius(f) + KELVIN_OFFSET
}

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - KELVIN_OFFSET
}

pub fn mph_to_mps(mph: f64) -> f64 {
    mph * MPS_PER_MPH
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * HPA_PER_INHG
}

/// Dew point in °C from a Fahrenheit temperature and relative humidity (%).
///
/// Uses the console driver's linear approximation `Td = K - (100 - RH) / 5`
/// evaluated in Kelvin, not the Magnus formula.
pub fn dew_point_celsius(temperature_f: f64, relative_humidity: f64) -> f64 {
    let k = fahrenheit_to_kelvin(temperature_f);
    let td = k - (100.0 - relative_humidity) / 5.0;
    kelvin_to_celsius(td)
}
