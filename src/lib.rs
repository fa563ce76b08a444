// src/lib.rs

//! Data acquisition for Davis Vantage Pro weather stations.
//!
//! Readings come from one of three transports (a text report file, the LOOP
//! protocol on a serial port, or the same protocol over TCP), are decoded into
//! metric units, and are published into a [`SensorStore`] that a background
//! [`Fetcher`] keeps current. [`StationFacade`] reads them back as named
//! physical properties.

pub mod common;
pub mod config;
pub mod fetcher;
pub mod station;
pub mod store;
pub mod transport;

// Re-export key types for convenience
pub use common::{DataSource, OpMode, PacketError, ProtocolError, StationModel};
pub use config::{ConfigError, StationConfig};
pub use fetcher::{FetchError, Fetcher};
pub use station::{Measurement, StationError, StationFacade};
pub use store::SensorStore;
pub use transport::{Transport, TransportError};
