// src/transport/clock.rs

use crate::common::hal_traits::StationTimer;
use std::thread;
use std::time::{Duration, Instant};

/// Wall-clock timer for the real links: `std::time::Instant` plus thread sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl StationTimer for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
