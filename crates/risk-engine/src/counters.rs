//! Per-trip event counters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

use crate::RiskError;

/// Countable per-frame events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Drowsiness,
    Yawning,
    LookingAway,
}

impl FromStr for EventKind {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drowsiness" => Ok(Self::Drowsiness),
            "yawning" => Ok(Self::Yawning),
            // "distraction" is the legacy name
            "looking_away" | "distraction" => Ok(Self::LookingAway),
            other => Err(RiskError::UnknownEvent(other.to_string())),
        }
    }
}

/// Accumulated counters of one trip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripCounters {
    pub drowsiness_events: u64,
    pub yawning_events: u64,
    pub looking_away_events: u64,
    pub overspeed_count: u64,
    pub total_frames_analyzed: u64,
}

impl TripCounters {
    pub fn increment(&mut self, kind: EventKind) {
        let counter = match kind {
            EventKind::Drowsiness => &mut self.drowsiness_events,
            EventKind::Yawning => &mut self.yawning_events,
            EventKind::LookingAway => &mut self.looking_away_events,
        };
        *counter = counter.saturating_add(1);
    }

    /// Count one analysed frame; overspeed only when strictly above the limit
    pub fn record_speed(&mut self, speed: f64, limit: f64) {
        self.total_frames_analyzed = self.total_frames_analyzed.saturating_add(1);
        if speed > limit {
            self.overspeed_count = self.overspeed_count.saturating_add(1);
        }
    }

    pub fn events(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Drowsiness => self.drowsiness_events,
            EventKind::Yawning => self.yawning_events,
            EventKind::LookingAway => self.looking_away_events,
        }
    }

    /// Share of analysed frames above the speed limit; 0 with no frames
    pub fn overspeed_ratio(&self) -> f64 {
        self.overspeed_count as f64 / self.total_frames_analyzed.max(1) as f64
    }

    pub fn has_fatigue_events(&self) -> bool {
        self.drowsiness_events > 0 || self.yawning_events > 0
    }
}

type SharedCounters = Arc<Mutex<TripCounters>>;

/// Trip-keyed counter store with one lock per trip.
///
/// Updates share the map's read lock and serialize on the trip's own mutex;
/// removal takes the write lock, so it never detaches counters mid-update.
#[derive(Debug, Default)]
pub struct TripCounterStore {
    trips: RwLock<HashMap<String, SharedCounters>>,
}

impl TripCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the trip's counters under its lock, creating them if needed
    pub fn update<R>(&self, trip: &str, f: impl FnOnce(&mut TripCounters) -> R) -> R {
        loop {
            // Read lock held through `f`: reset and complete wait for it
            {
                let trips = self.trips.read().unwrap_or_else(PoisonError::into_inner);
                if let Some(entry) = trips.get(trip) {
                    let mut counters = entry.lock().unwrap_or_else(PoisonError::into_inner);
                    return f(&mut counters);
                }
            }

            self.trips
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(trip.to_string())
                .or_insert_with(|| {
                    debug!("Creating counters for trip '{}'", trip);
                    Arc::default()
                });
        }
    }

    /// Current counters, created as zeros on first use
    pub fn get_or_create(&self, trip: &str) -> TripCounters {
        self.update(trip, |c| *c)
    }

    /// Current counters without creating an entry
    pub fn snapshot(&self, trip: &str) -> Option<TripCounters> {
        let entry = self
            .trips
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trip)
            .cloned()?;
        let counters = *entry.lock().unwrap_or_else(PoisonError::into_inner);
        Some(counters)
    }

    pub fn increment_event(&self, trip: &str, kind: EventKind) -> TripCounters {
        self.update(trip, |c| {
            c.increment(kind);
            *c
        })
    }

    pub fn record_speed_sample(&self, trip: &str, speed: f64, limit: f64) -> TripCounters {
        self.update(trip, |c| {
            c.record_speed(speed, limit);
            *c
        })
    }

    /// Delete the trip's counters; the next access starts from zero
    pub fn reset(&self, trip: &str) {
        let removed = self
            .trips
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(trip);
        if removed.is_some() {
            info!("Counters reset for trip '{}'", trip);
        }
    }

    /// Final counters of the trip, then delete them.
    ///
    /// A trip without counters (never seen or already completed) reports zeros.
    pub fn complete(&self, trip: &str) -> TripCounters {
        let removed = self
            .trips
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(trip);
        match removed {
            Some(entry) => {
                let counters = *entry.lock().unwrap_or_else(PoisonError::into_inner);
                info!(
                    "Trip '{}' completed after {} frames",
                    trip, counters.total_frames_analyzed
                );
                counters
            }
            None => TripCounters::default(),
        }
    }

    pub fn trip_count(&self) -> usize {
        self.trips.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lazy_creation() {
        let store = TripCounterStore::new();
        assert_eq!(store.snapshot("T1"), None);
        assert_eq!(store.get_or_create("T1"), TripCounters::default());
        assert_eq!(store.snapshot("T1"), Some(TripCounters::default()));
        assert_eq!(store.trip_count(), 1);
    }

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!("drowsiness".parse::<EventKind>().unwrap(), EventKind::Drowsiness);
        assert_eq!("yawning".parse::<EventKind>().unwrap(), EventKind::Yawning);
        assert_eq!("looking_away".parse::<EventKind>().unwrap(), EventKind::LookingAway);
        assert_eq!("distraction".parse::<EventKind>().unwrap(), EventKind::LookingAway);
        assert!("sneezing".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_increment_and_speed() {
        let store = TripCounterStore::new();
        store.increment_event("T1", EventKind::Drowsiness);
        store.increment_event("T1", EventKind::LookingAway);
        store.record_speed_sample("T1", 80.0, 80.0);
        let counters = store.record_speed_sample("T1", 80.5, 80.0);

        assert_eq!(counters.drowsiness_events, 1);
        assert_eq!(counters.looking_away_events, 1);
        assert_eq!(counters.yawning_events, 0);
        assert_eq!(counters.overspeed_count, 1);
        assert_eq!(counters.total_frames_analyzed, 2);
        assert_eq!(counters.overspeed_ratio(), 0.5);
    }

    #[test]
    fn test_trips_are_isolated() {
        let store = TripCounterStore::new();
        store.increment_event("T1", EventKind::Yawning);
        assert_eq!(store.get_or_create("T2"), TripCounters::default());
        assert_eq!(store.get_or_create("T1").yawning_events, 1);
    }

    #[test]
    fn test_reset_deletes() {
        let store = TripCounterStore::new();
        store.increment_event("T1", EventKind::Drowsiness);
        store.record_speed_sample("T1", 120.0, 80.0);
        store.reset("T1");

        assert_eq!(store.snapshot("T1"), None);
        assert_eq!(store.get_or_create("T1"), TripCounters::default());
    }

    #[test]
    fn test_ratio_with_zero_frames() {
        let counters = TripCounters {
            overspeed_count: 0,
            total_frames_analyzed: 0,
            ..Default::default()
        };
        assert_eq!(counters.overspeed_ratio(), 0.0);
    }

    #[test]
    fn test_complete_is_one_shot() {
        let store = TripCounterStore::new();
        store.increment_event("T1", EventKind::Yawning);
        store.record_speed_sample("T1", 50.0, 80.0);

        let summary = store.complete("T1");
        assert_eq!(summary.yawning_events, 1);
        assert_eq!(summary.total_frames_analyzed, 1);

        assert_eq!(store.complete("T1"), TripCounters::default());
        assert_eq!(store.trip_count(), 0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store = TripCounterStore::new();
        std::thread::scope(|s| {
            for i in 0..8 {
                let store = &store;
                s.spawn(move || {
                    let trip = if i % 2 == 0 { "T1" } else { "T2" };
                    for _ in 0..250 {
                        store.update(trip, |c| {
                            c.increment(EventKind::Drowsiness);
                            c.record_speed(90.0, 80.0);
                        });
                    }
                });
            }
        });

        for trip in ["T1", "T2"] {
            let counters = store.get_or_create(trip);
            assert_eq!(counters.drowsiness_events, 1000);
            assert_eq!(counters.total_frames_analyzed, 1000);
            assert_eq!(counters.overspeed_count, 1000);
        }
    }

    #[test]
    fn test_complete_waits_for_in_flight_update() {
        let store = Arc::new(TripCounterStore::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let updater = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.update("T1", |c| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    c.increment(EventKind::Drowsiness);
                })
            })
        };
        entered_rx.recv().unwrap();

        let completer = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.complete("T1"))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!completer.is_finished());

        release_tx.send(()).unwrap();
        updater.join().unwrap();
        assert_eq!(completer.join().unwrap().drowsiness_events, 1);
        assert_eq!(store.snapshot("T1"), None);
    }

    #[test]
    fn test_reset_after_in_flight_update_starts_from_zero() {
        let store = Arc::new(TripCounterStore::new());
        store.increment_event("T1", EventKind::Yawning);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let updater = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.update("T1", |c| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    c.increment(EventKind::Yawning);
                })
            })
        };
        entered_rx.recv().unwrap();

        let resetter = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.reset("T1"))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!resetter.is_finished());

        release_tx.send(()).unwrap();
        updater.join().unwrap();
        resetter.join().unwrap();
        assert_eq!(store.snapshot("T1"), None);
        assert_eq!(store.increment_event("T1", EventKind::Yawning).yawning_events, 1);
    }
}
