// src/fetcher/cycle.rs

use crate::common::{crc, error::PacketError, packet, types::SensorSnapshot};
use crate::transport::{ReportPoll, Transport, TransportError};
use chrono::{DateTime, Utc};
use log::{debug, trace};

/// Reasons a fetch cycle produced no readings.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Bad CRC (transmitted {transmitted:#06x}), packet discarded")]
    BadCrc { transmitted: u16 },

    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// What one cycle brought back.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquired {
    Fresh {
        values: SensorSnapshot,
        observed_at: DateTime<Utc>,
    },
    /// The report file has not changed since the previous cycle.
    Unchanged,
}

/// Runs one acquisition: open, read, close.
///
/// `station_model` is filled by the identify step the first time a wire
/// transport wakes up and is left alone afterwards. The transport is closed
/// whatever the outcome.
pub fn acquire(
    transport: &mut dyn Transport,
    station_model: &mut Option<String>,
) -> Result<Acquired, FetchError> {
    let result = match transport.open() {
        Ok(()) => acquire_open(transport, station_model),
        Err(e) => Err(e.into()),
    };
    transport.close();
    result
}

fn acquire_open(
    transport: &mut dyn Transport,
    station_model: &mut Option<String>,
) -> Result<Acquired, FetchError> {
    if let Some(poll) = transport.read_report() {
        return Ok(match poll? {
            ReportPoll::Unchanged => Acquired::Unchanged,
            ReportPoll::Fresh(report) => Acquired::Fresh {
                values: report.values,
                observed_at: report.observed_at,
            },
        });
    }

    transport.wakeup()?;

    if station_model.is_none() {
        let model = transport.identify()?;
        debug!("{}: identified as {}", transport.data_source(), model);
        *station_model = Some(model);
    }

    let frame = transport.fetch_loop_packet()?;
    trace!("LOOP frame: {}", packet::hex_dump(&frame));

    if !crc::validate(&frame) {
        return Err(FetchError::BadCrc {
            transmitted: packet::transmitted_crc(&frame).unwrap_or_default(),
        });
    }

    let values = packet::parse(&frame)?;
    Ok(Acquired::Fresh {
        values,
        observed_at: Utc::now(),
    })
}
