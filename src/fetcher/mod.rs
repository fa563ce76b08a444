// src/fetcher/mod.rs

//! Periodic acquisition: one background thread per station runs a fetch
//! cycle against its transport on a fixed interval and publishes the results
//! into the shared [`SensorStore`].

pub mod cycle;

pub use cycle::{Acquired, FetchError};

use crate::common::types::DataSource;
use crate::store::{lock, SensorStore};
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    armed: bool,
    last_read: Option<DateTime<Utc>>,
    station_model: Option<String>,
    /// Bumped after every cycle that published readings.
    updates: u64,
}

struct Inner {
    transport: Mutex<Box<dyn Transport>>,
    store: Arc<SensorStore>,
    source: DataSource,
    interval: Duration,
    state: Mutex<State>,
    /// Wakes the worker early when disarmed.
    wake: Condvar,
    /// Signalled after each published update.
    updated: Condvar,
}

impl Inner {
    /// Lock order is transport, then state. Nothing takes them the other way.
    fn fetch_once(&self) -> Result<bool, FetchError> {
        let mut transport = lock(&self.transport);
        let mut station_model = lock(&self.state).station_model.clone();

        let acquired = cycle::acquire(&mut **transport, &mut station_model);

        let mut state = lock(&self.state);
        state.station_model = station_model;
        match acquired {
            Ok(Acquired::Fresh {
                values,
                observed_at,
            }) => {
                debug!("{}: publishing {} values", self.source, values.len());
                self.store.commit(values);
                state.last_read = Some(observed_at);
                state.updates += 1;
                drop(state);
                self.updated.notify_all();
                Ok(true)
            }
            Ok(Acquired::Unchanged) => Ok(false),
            Err(e) => {
                warn!("{}: fetch cycle failed: {}", self.source, e);
                Err(e)
            }
        }
    }

    fn run(self: Arc<Self>) {
        info!("{}: fetcher started, interval {:?}", self.source, self.interval);
        loop {
            if !lock(&self.state).armed {
                break;
            }
            // Failures are logged inside; the next tick retries.
            let _ = self.fetch_once();

            let state = lock(&self.state);
            let (state, _) = self
                .wake
                .wait_timeout_while(state, self.interval, |s| s.armed)
                .unwrap_or_else(PoisonError::into_inner);
            if !state.armed {
                break;
            }
        }
        info!("{}: fetcher stopped", self.source);
    }
}

/// Owns a transport and drives it on a timer.
pub struct Fetcher {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Fetcher {
    pub fn new(transport: Box<dyn Transport>, store: Arc<SensorStore>, interval: Duration) -> Self {
        let source = transport.data_source();
        Fetcher {
            inner: Arc::new(Inner {
                transport: Mutex::new(transport),
                store,
                source,
                interval,
                state: Mutex::new(State::default()),
                wake: Condvar::new(),
                updated: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn data_source(&self) -> &DataSource {
        &self.inner.source
    }

    pub fn store(&self) -> &Arc<SensorStore> {
        &self.inner.store
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Arms the timer. The first cycle runs immediately on the worker thread.
    /// Calling `start` on a running fetcher does nothing; a worker that died
    /// is replaced.
    pub fn start(&self) -> io::Result<()> {
        let mut worker = lock(&self.worker);
        {
            let mut state = lock(&self.inner.state);
            if state.armed && worker_alive(&worker) {
                return Ok(());
            }
            state.armed = true;
        }
        if let Some(finished) = worker.take() {
            if finished.join().is_err() {
                warn!("{}: previous fetcher thread panicked", self.inner.source);
            }
        }

        let inner = Arc::clone(&self.inner);
        match thread::Builder::new()
            .name("vantagepro-fetcher".to_string())
            .spawn(move || inner.run())
        {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                lock(&self.inner.state).armed = false;
                Err(e)
            }
        }
    }

    /// Disarms the timer and waits for the worker. A cycle already running
    /// completes first.
    pub fn stop(&self) {
        lock(&self.inner.state).armed = false;
        self.inner.wake.notify_all();
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                warn!("{}: fetcher thread panicked", self.inner.source);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        let worker = lock(&self.worker);
        lock(&self.inner.state).armed && worker_alive(&worker)
    }

    /// Runs one cycle on the calling thread. Returns whether new readings
    /// were published.
    pub fn fetch_once(&self) -> Result<bool, FetchError> {
        self.inner.fetch_once()
    }

    /// When the last published readings were taken.
    pub fn last_read(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.state).last_read
    }

    /// Whole seconds since the last published readings, `-1` if none yet.
    pub fn time_since_last_update(&self) -> i64 {
        match self.last_read() {
            Some(at) => (Utc::now() - at).num_seconds().max(0),
            None => -1,
        }
    }

    /// Station model reported by the identify step, if it has run.
    pub fn station_model(&self) -> Option<String> {
        lock(&self.inner.state).station_model.clone()
    }

    /// Number of cycles that published readings.
    pub fn update_count(&self) -> u64 {
        lock(&self.inner.state).updates
    }

    /// Blocks until the next cycle publishes readings or `timeout` passes.
    /// Returns `true` if an update arrived.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        let state = lock(&self.inner.state);
        let seen = state.updates;
        let (state, _) = self
            .inner
            .updated
            .wait_timeout_while(state, timeout, |s| s.updates == seen)
            .unwrap_or_else(PoisonError::into_inner);
        state.updates != seen
    }
}

fn worker_alive(worker: &Option<JoinHandle<()>>) -> bool {
    worker.as_ref().is_some_and(|handle| !handle.is_finished())
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// --- Scripted transport shared by the fetcher and station tests ---
#[cfg(test)]
pub(crate) mod test_transport {
    use crate::common::error::ProtocolError;
    use crate::common::types::{DataSource, LoopPacket};
    use crate::store::lock;
    use crate::transport::{ReportPoll, Transport, TransportError};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Default)]
    pub struct Script {
        pub open_fails: bool,
        pub wakeup_fails: bool,
        pub model: Option<&'static str>,
        pub packet: Option<LoopPacket>,
        /// Non-empty turns the mock into a report transport.
        pub reports: VecDeque<ReportPoll>,
        pub fetch_delay: Duration,
        /// Number of fetches that panic before the script behaves.
        pub panic_fetches: usize,
    }

    /// Names of the transport calls made, in order.
    #[derive(Debug, Clone, Default)]
    pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

    impl CallLog {
        fn push(&self, call: &'static str) {
            lock(&self.0).push(call);
        }

        pub fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *lock(&self.0))
        }

        pub fn count(&self, call: &str) -> usize {
            lock(&self.0).iter().filter(|c| **c == call).count()
        }
    }

    pub struct MockTransport {
        script: Script,
        report_mode: bool,
        calls: CallLog,
    }

    impl MockTransport {
        pub fn new(script: Script) -> (Self, CallLog) {
            let calls = CallLog::default();
            let transport = MockTransport {
                report_mode: !script.reports.is_empty(),
                script,
                calls: calls.clone(),
            };
            (transport, calls)
        }
    }

    impl Transport for MockTransport {
        fn data_source(&self) -> DataSource {
            DataSource {
                kind: "mock",
                details: "[mock]".to_string(),
            }
        }

        fn open(&mut self) -> Result<(), TransportError> {
            self.calls.push("open");
            if self.script.open_fails {
                return Err(TransportError::Connect(io::Error::from(
                    io::ErrorKind::ConnectionRefused,
                )));
            }
            Ok(())
        }

        fn wakeup(&mut self) -> Result<(), TransportError> {
            self.calls.push("wakeup");
            if self.script.wakeup_fails {
                return Err(TransportError::Protocol(ProtocolError::WakeupFailed {
                    attempts: 3,
                }));
            }
            Ok(())
        }

        fn identify(&mut self) -> Result<String, TransportError> {
            self.calls.push("identify");
            Ok(self
                .script
                .model
                .unwrap_or("Vantage Pro or Vantage Pro 2")
                .to_string())
        }

        fn fetch_loop_packet(&mut self) -> Result<LoopPacket, TransportError> {
            self.calls.push("fetch");
            if self.script.panic_fetches > 0 {
                self.script.panic_fetches -= 1;
                panic!("scripted fetch panic");
            }
            if !self.script.fetch_delay.is_zero() {
                thread::sleep(self.script.fetch_delay);
            }
            self.script
                .packet
                .ok_or(TransportError::Protocol(ProtocolError::Timeout))
        }

        fn close(&mut self) {
            self.calls.push("close");
        }

        fn read_report(&mut self) -> Option<Result<ReportPoll, TransportError>> {
            if !self.report_mode {
                return None;
            }
            self.calls.push("read_report");
            Some(Ok(self.script.reports.pop_front().unwrap_or(ReportPoll::Unchanged)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_transport::{MockTransport, Script};
    use super::*;
    use crate::common::packet::test_frames::{loop_packet, Fields};
    use crate::common::types::keys;
    use crate::transport::{Report, ReportPoll};
    use std::time::Instant;

    fn wire_fetcher(script: Script, interval: Duration) -> (Fetcher, test_transport::CallLog) {
        let (transport, calls) = MockTransport::new(script);
        let fetcher = Fetcher::new(Box::new(transport), Arc::new(SensorStore::new()), interval);
        (fetcher, calls)
    }

    fn wait_for_count(fetcher: &Fetcher, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while fetcher.update_count() < count {
            assert!(Instant::now() < deadline, "no update within 5s");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn good_script() -> Script {
        Script {
            packet: Some(loop_packet(Fields::default())),
            ..Script::default()
        }
    }

    #[test]
    fn test_fetch_once_publishes() {
        let (fetcher, _) = wire_fetcher(good_script(), Duration::from_secs(60));
        assert_eq!(fetcher.time_since_last_update(), -1);
        assert_eq!(fetcher.station_model(), None);

        assert!(fetcher.fetch_once().unwrap());
        assert_eq!(fetcher.store().len(), 8);
        assert_eq!(fetcher.store().get(keys::WIND_DIR).as_deref(), Some("270"));
        assert!(fetcher.last_read().is_some());
        assert!((0..=1).contains(&fetcher.time_since_last_update()));
        assert_eq!(fetcher.station_model().as_deref(), Some("Vantage Pro or Vantage Pro 2"));
        assert_eq!(fetcher.update_count(), 1);
    }

    #[test]
    fn test_failed_cycle_leaves_store_alone() {
        let (fetcher, calls) = wire_fetcher(
            Script {
                wakeup_fails: true,
                ..good_script()
            },
            Duration::from_secs(60),
        );
        fetcher.store().set(keys::OUTSIDE_TEMP, "20.0");

        assert!(fetcher.fetch_once().is_err());
        assert_eq!(calls.count("fetch"), 0);
        assert_eq!(fetcher.store().get(keys::OUTSIDE_TEMP).as_deref(), Some("20.0"));
        assert_eq!(fetcher.store().len(), 1);
        assert_eq!(fetcher.last_read(), None);
    }

    #[test]
    fn test_unchanged_report_keeps_last_read() {
        let observed_at = Utc::now() - chrono::Duration::seconds(90);
        let report = Report {
            values: [(keys::OUTSIDE_TEMP.to_string(), "9.5".to_string())].into(),
            observed_at,
        };
        let (fetcher, _) = wire_fetcher(
            Script {
                reports: vec![ReportPoll::Fresh(report)].into(),
                ..Script::default()
            },
            Duration::from_secs(60),
        );

        assert!(fetcher.fetch_once().unwrap());
        assert_eq!(fetcher.last_read(), Some(observed_at));
        assert!(fetcher.time_since_last_update() >= 90);

        assert!(!fetcher.fetch_once().unwrap());
        assert_eq!(fetcher.last_read(), Some(observed_at));
        assert_eq!(fetcher.update_count(), 1);
    }

    #[test]
    fn test_rewritten_report_updates_changed_keys() {
        use crate::transport::FileTransport;
        use std::fs;
        use std::time::SystemTime;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(
            &path,
            "StationName=Wise\noutsideTemp=10.0\noutsideHumidity=60\n",
        )
        .unwrap();

        let fetcher = Fetcher::new(
            Box::new(FileTransport::new(&path)),
            Arc::new(SensorStore::new()),
            Duration::from_secs(60),
        );
        assert!(fetcher.fetch_once().unwrap());
        assert_eq!(fetcher.store().len(), 3);

        fs::write(&path, "outsideTemp=12.5\noutsideHumidity=48\n").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();

        assert!(fetcher.fetch_once().unwrap());
        let store = fetcher.store();
        assert_eq!(store.get(keys::OUTSIDE_TEMP).as_deref(), Some("12.5"));
        assert_eq!(store.get(keys::OUTSIDE_HUMIDITY).as_deref(), Some("48"));
        assert_eq!(store.get(keys::STATION_NAME).as_deref(), Some("Wise"));
        assert_eq!(store.len(), 3);
        assert_eq!(fetcher.update_count(), 2);

        assert!(!fetcher.fetch_once().unwrap());
    }

    #[test]
    fn test_timer_runs_cycles_until_stopped() {
        let (fetcher, calls) = wire_fetcher(good_script(), Duration::from_millis(20));
        fetcher.start().unwrap();
        assert!(fetcher.is_running());

        assert!(fetcher.wait_for_update(Duration::from_secs(5)));
        assert!(fetcher.wait_for_update(Duration::from_secs(5)));
        fetcher.stop();
        assert!(!fetcher.is_running());

        let cycles = calls.count("open");
        assert!(cycles >= 2);
        // Identify is only needed once.
        assert_eq!(calls.count("identify"), 1);

        thread::sleep(Duration::from_millis(60));
        assert_eq!(calls.count("open"), cycles);
    }

    #[test]
    fn test_stop_lets_running_cycle_finish() {
        let (fetcher, calls) = wire_fetcher(
            Script {
                fetch_delay: Duration::from_millis(200),
                ..good_script()
            },
            Duration::from_secs(60),
        );
        fetcher.start().unwrap();
        while calls.count("fetch") == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        fetcher.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(fetcher.last_read().is_some());
        assert_eq!(calls.take().last(), Some(&"close"));
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let (fetcher, _) = wire_fetcher(good_script(), Duration::from_secs(3600));
        fetcher.start().unwrap();
        wait_for_count(&fetcher, 1);

        let started = Instant::now();
        fetcher.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_for_update_times_out() {
        let (fetcher, _) = wire_fetcher(good_script(), Duration::from_secs(60));
        assert!(!fetcher.wait_for_update(Duration::from_millis(30)));
    }

    #[test]
    fn test_restart_after_worker_panic() {
        let (fetcher, calls) = wire_fetcher(
            Script {
                panic_fetches: 1,
                ..good_script()
            },
            Duration::from_secs(3600),
        );
        fetcher.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while fetcher.is_running() {
            assert!(Instant::now() < deadline, "worker did not die");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(calls.count("fetch"), 1);
        assert_eq!(fetcher.update_count(), 0);

        // The dead worker is joined and a fresh one runs normally.
        fetcher.start().unwrap();
        assert!(fetcher.is_running());
        wait_for_count(&fetcher, 1);
        fetcher.stop();
        assert_eq!(calls.count("fetch"), 2);
    }

    #[test]
    fn test_restart_after_stop() {
        let (fetcher, _) = wire_fetcher(good_script(), Duration::from_secs(3600));
        fetcher.start().unwrap();
        wait_for_count(&fetcher, 1);
        fetcher.stop();

        fetcher.start().unwrap();
        wait_for_count(&fetcher, 2);
        fetcher.stop();
        assert_eq!(fetcher.update_count(), 2);
    }
}
