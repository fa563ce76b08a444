// src/transport/file.rs

use super::{Report, ReportPoll, Transport, TransportError};
use crate::common::{
    timing,
    types::{keys, DataSource, LoopPacket, SensorSnapshot},
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::SystemTime;

/// Layouts accepted for `utcDate` + `utcTime`, tried in order. Two-digit
/// years come first so `26` is never read as year 26.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%m/%d/%y %I:%M%p",
    "%m/%d/%Y %I:%M%p",
    "%m/%d/%y %I:%M:%S%p",
    "%m/%d/%Y %I:%M:%S%p",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%y %H:%M",
    "%d.%m.%Y %H:%M",
];

/// Parses `key=value` lines. Keys and values are trimmed; lines that do not
/// split into exactly two tokens, or have an empty key, are skipped.
pub fn parse_report(text: &str) -> SensorSnapshot {
    let mut values = SensorSnapshot::new();
    for line in text.lines() {
        let mut tokens = line.split('=');
        let (Some(key), Some(value), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        values.insert(key.to_string(), value.trim().to_string());
    }
    values
}

/// Combines the report's `utcDate` and `utcTime` into a UTC timestamp.
///
/// Times like `3:05p` get the missing `m` appended before parsing.
pub fn parse_observed_at(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let mut time = time.trim().to_ascii_uppercase();
    if time.ends_with('A') || time.ends_with('P') {
        time.push('M');
    }
    let stamp = format!("{} {}", date.trim(), time);
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&stamp, layout).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Reads the text report another program periodically rewrites.
pub struct FileTransport {
    path: PathBuf,
    opened: bool,
    last_modified: Option<SystemTime>,
    station_model: Option<String>,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTransport {
            path: path.into(),
            opened: false,
            last_modified: None,
            station_model: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn source(&self) -> String {
        format!("[{}]", self.path.display())
    }

    /// The report may be mid-rewrite; give the writer a few chances.
    fn read_with_retries(&self) -> io::Result<String> {
        let mut attempt = 1;
        loop {
            match fs::read_to_string(&self.path) {
                Ok(text) => return Ok(text),
                Err(e) if attempt < timing::REPORT_READ_ATTEMPTS => {
                    debug!("{}: read attempt {} failed: {}", self.source(), attempt, e);
                    attempt += 1;
                    thread::sleep(timing::REPORT_RETRY_PAUSE);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn poll(&mut self) -> Result<ReportPoll, TransportError> {
        let modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(TransportError::Report)?;

        if self.last_modified.is_some_and(|last| modified <= last) {
            debug!("{}: did not change", self.source());
            return Ok(ReportPoll::Unchanged);
        }

        let text = self.read_with_retries().map_err(TransportError::Report)?;
        let values = parse_report(&text);
        if values.is_empty() {
            return Err(TransportError::Report(io::Error::new(
                io::ErrorKind::InvalidData,
                "report has no key=value lines",
            )));
        }

        let observed_at = match (values.get(keys::UTC_DATE), values.get(keys::UTC_TIME)) {
            (Some(date), Some(time)) => parse_observed_at(date, time).unwrap_or_else(|| {
                warn!(
                    "{}: cannot parse timestamp '{} {}', using current time",
                    self.source(),
                    date,
                    time
                );
                Utc::now()
            }),
            _ => Utc::now(),
        };

        if let Some(model) = values.get(keys::STATION_MODEL).filter(|m| !m.is_empty()) {
            self.station_model = Some(model.clone());
        }
        self.last_modified = Some(modified);
        debug!("{}: read {} values", self.source(), values.len());

        Ok(ReportPoll::Fresh(Report {
            values,
            observed_at,
        }))
    }
}

impl Transport for FileTransport {
    fn data_source(&self) -> DataSource {
        DataSource {
            kind: "file",
            details: self.source(),
        }
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.path.as_os_str().is_empty() {
            return Err(TransportError::Config("Empty report file name".to_string()));
        }
        if !self.path.exists() {
            return Err(TransportError::Connect(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", self.path.display()),
            )));
        }
        self.opened = true;
        Ok(())
    }

    fn wakeup(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Model named by the last report read.
    fn identify(&mut self) -> Result<String, TransportError> {
        self.station_model
            .clone()
            .ok_or(TransportError::Unsupported("identify before a report is read"))
    }

    fn fetch_loop_packet(&mut self) -> Result<LoopPacket, TransportError> {
        Err(TransportError::Unsupported("LOOP request"))
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn read_report(&mut self) -> Option<Result<ReportPoll, TransportError>> {
        if !self.opened {
            return Some(Err(TransportError::NotOpen));
        }
        Some(self.poll())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const REPORT: &str = "\
StationName=Wise Observatory
stationModel=Vantage Pro 2
utcDate=10/16/26
utcTime=3:05p
outsideTemp=12.3
outsideHumidity=55
windSpeed = 3.1
not a pair
a=b=c
=orphan
";

    fn report_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn fresh(poll: Option<Result<ReportPoll, TransportError>>) -> Report {
        match poll {
            Some(Ok(ReportPoll::Fresh(report))) => report,
            other => panic!("expected a fresh report, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_report_lines() {
        let values = parse_report(REPORT);
        assert_eq!(values.get("StationName").unwrap(), "Wise Observatory");
        assert_eq!(values.get("windSpeed").unwrap(), "3.1");
        assert_eq!(values.get("outsideHumidity").unwrap(), "55");
        assert!(!values.contains_key("a"));
        assert!(!values.contains_key(""));
        assert_eq!(values.len(), 7);
    }

    #[test]
    fn test_parse_observed_at() {
        let at = parse_observed_at("10/16/26", "3:05p").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-10-16T15:05:00+00:00");
        let at = parse_observed_at("10/16/2026", "11:40a").unwrap();
        assert_eq!((at.year(), at.format("%H:%M").to_string()), (2026, "11:40".to_string()));
        let at = parse_observed_at("2026-01-02", "23:59:10").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-01-02T23:59:10+00:00");
        assert!(parse_observed_at("yesterday", "noon").is_none());
    }

    #[test]
    fn test_read_report() {
        let file = report_file(REPORT);
        let mut transport = FileTransport::new(file.path());
        transport.open().unwrap();

        let report = fresh(transport.read_report());
        assert_eq!(report.values.get("outsideTemp").unwrap(), "12.3");
        assert_eq!(report.observed_at.to_rfc3339(), "2026-10-16T15:05:00+00:00");
        assert_eq!(transport.identify().unwrap(), "Vantage Pro 2");
        assert_eq!(transport.data_source().kind, "file");
    }

    #[test]
    fn test_unchanged_file_is_not_reread() {
        let file = report_file(REPORT);
        let mut transport = FileTransport::new(file.path());
        transport.open().unwrap();

        fresh(transport.read_report());
        assert!(matches!(transport.read_report(), Some(Ok(ReportPoll::Unchanged))));
    }

    #[test]
    fn test_newer_file_is_reread() {
        let file = report_file(REPORT);
        let mut transport = FileTransport::new(file.path());
        transport.open().unwrap();
        fresh(transport.read_report());

        fs::write(file.path(), "outsideTemp=14.0\noutsideHumidity=55\n").unwrap();
        let later = SystemTime::now() + Duration::from_secs(10);
        fs::File::options()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_modified(later)
            .unwrap();

        let report = fresh(transport.read_report());
        assert_eq!(report.values.get("outsideTemp").unwrap(), "14.0");
        assert_eq!(report.values.len(), 2);
    }

    #[test]
    fn test_unparseable_timestamp_falls_back_to_now() {
        let file = report_file("utcDate=someday\nutcTime=later\noutsideTemp=1.0\n");
        let mut transport = FileTransport::new(file.path());
        transport.open().unwrap();

        let before = Utc::now();
        let report = fresh(transport.read_report());
        assert!(report.observed_at >= before);
    }

    #[test]
    fn test_empty_report_is_an_error() {
        let file = report_file("\n\n");
        let mut transport = FileTransport::new(file.path());
        transport.open().unwrap();
        assert!(matches!(transport.read_report(), Some(Err(TransportError::Report(_)))));
    }

    #[test]
    fn test_open_errors() {
        let mut empty = FileTransport::new("");
        assert!(matches!(empty.open(), Err(TransportError::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        let mut missing = FileTransport::new(dir.path().join("report.txt"));
        assert!(matches!(missing.open(), Err(TransportError::Connect(_))));
        assert!(matches!(missing.read_report(), Some(Err(TransportError::NotOpen))));
    }

    #[test]
    fn test_wire_operations_unsupported() {
        let mut transport = FileTransport::new("report.txt");
        assert!(matches!(
            transport.fetch_loop_packet(),
            Err(TransportError::Unsupported(_))
        ));
        assert!(transport.wakeup().is_ok());
    }
}
