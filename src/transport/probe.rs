// src/transport/probe.rs

//! One-shot connection tests used when configuring a station.

use super::file::parse_report;
use super::{FileTransport, SerialTransport, SocketTransport, Transport, TransportError};
use crate::common::types::keys;
use log::info;
use std::fs;
use std::path::Path;

/// Result of a connection test, with a message suitable for a settings dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub message: String,
}

impl ProbeOutcome {
    fn ok(message: String) -> Self {
        ProbeOutcome { ok: true, message }
    }

    fn failed(message: String) -> Self {
        ProbeOutcome { ok: false, message }
    }
}

/// Opens, wakes and identifies a station over a wire transport, then closes it.
pub fn probe_station(transport: &mut dyn Transport) -> ProbeOutcome {
    let source = transport.data_source();
    let identified = identify_station(transport);
    transport.close();

    let outcome = match identified {
        Ok(model) => ProbeOutcome::ok(format!(
            "Found a \"{}\" type station at {}.",
            model, source.details
        )),
        Err(e) => ProbeOutcome::failed(format!(
            "Could not find a station at {}: {}",
            source.details, e
        )),
    };
    info!("probe {}: {}", source, outcome.message);
    outcome
}

fn identify_station(transport: &mut dyn Transport) -> Result<String, TransportError> {
    transport.open()?;
    transport.wakeup()?;
    transport.identify()
}

pub fn test_serial(port_name: &str, speed: u32) -> ProbeOutcome {
    if port_name.trim().is_empty() {
        return ProbeOutcome::failed("Empty serial port name!".to_string());
    }
    probe_station(&mut SerialTransport::new(port_name, speed))
}

pub fn test_socket(address: &str, port: u16) -> ProbeOutcome {
    if address.trim().is_empty() {
        return ProbeOutcome::failed("Empty IP address!".to_string());
    }
    probe_station(&mut SocketTransport::new(address, port))
}

/// Checks that `path` holds a report with at least one reading.
pub fn test_file(path: &Path) -> ProbeOutcome {
    if path.as_os_str().is_empty() {
        return ProbeOutcome::failed("Empty report file name!".to_string());
    }
    if !path.exists() {
        return ProbeOutcome::failed(format!("File \"{}\" does not exist.", path.display()));
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            return ProbeOutcome::failed(format!("Cannot read \"{}\": {}", path.display(), e))
        }
    };

    let values = parse_report(&text);
    if values.is_empty() {
        return ProbeOutcome::failed(format!(
            "Cannot get weather data from \"{}\".",
            path.display()
        ));
    }

    let name = values
        .get(keys::STATION_NAME)
        .filter(|n| !n.is_empty())
        .map(String::as_str)
        .unwrap_or("unnamed");
    ProbeOutcome::ok(format!(
        "\"{}\" contains a valid report, station name: \"{}\".",
        path.display(),
        name
    ))
}

/// Probe matching a [`FileTransport`]'s own path.
pub fn test_file_transport(transport: &FileTransport) -> ProbeOutcome {
    test_file(transport.path())
}
