// src/store.rs

use crate::common::types::SensorSnapshot;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent, so a
/// poisoned lock carries no torn state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest sensor readings as pre-formatted strings, shared between the
/// fetcher thread (writer) and any number of readers.
#[derive(Debug, Default)]
pub struct SensorStore {
    values: Mutex<SensorSnapshot>,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`; `None` when absent or published as an empty string.
    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.values)
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.values).insert(key.into(), value.into());
    }

    /// Merges a full snapshot under a single lock, so readers see either all
    /// of it or none of it.
    pub fn commit(&self, snapshot: SensorSnapshot) {
        lock(&self.values).extend(snapshot);
    }

    /// Copy of every key/value pair.
    pub fn get_all(&self) -> SensorSnapshot {
        lock(&self.values).clone()
    }

    /// Runs `f` against the current values under the lock, for reads that
    /// must see several keys from the same cycle.
    pub fn read_with<R>(&self, f: impl FnOnce(&SensorSnapshot) -> R) -> R {
        f(&lock(&self.values))
    }

    pub fn clear(&self) {
        lock(&self.values).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.values).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_get_set() {
        let store = SensorStore::new();
        assert_eq!(store.get("outsideTemp"), None);
        store.set("outsideTemp", "12.5");
        assert_eq!(store.get("outsideTemp").as_deref(), Some("12.5"));
        store.set("outsideTemp", "");
        assert_eq!(store.get("outsideTemp"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_commit_merges() {
        let store = SensorStore::new();
        store.set("StationName", "Wise40");
        store.commit(SensorSnapshot::from([
            ("outsideTemp".to_string(), "1.0".to_string()),
            ("windSpeed".to_string(), "2.0".to_string()),
        ]));
        let all = store.get_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all["StationName"], "Wise40");
        assert_eq!(all["windSpeed"], "2.0");

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let store = Arc::new(SensorStore::new());
        store.set("k", "v");
        let poisoner = Arc::clone(&store);
        let _ = thread::spawn(move || {
            let _guard = poisoner.values.lock().unwrap();
            panic!("poison the store");
        })
        .join();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_readers_never_see_a_partial_commit() {
        const KEYS: [&str; 8] = [
            "outsideTemp",
            "outsideHumidity",
            "outsideDewPt",
            "barometer",
            "windSpeed",
            "windDir",
            "windGust",
            "rainRate",
        ];
        let store = Arc::new(SensorStore::new());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for generation in 0..2_000u32 {
                    let snapshot = KEYS
                        .iter()
                        .map(|k| (k.to_string(), generation.to_string()))
                        .collect();
                    store.commit(snapshot);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let all = store.get_all();
                        let mut generations = all.values();
                        if let Some(first) = generations.next() {
                            assert!(generations.all(|g| g == first), "mixed snapshot: {:?}", all);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get("rainRate").as_deref(), Some("1999"));
    }
}
