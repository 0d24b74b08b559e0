//! Palm-hold session tracking

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::GestureScope;

/// Palm state of one gesture session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Closed,
    Open {
        since: Instant,
        owner: String,
    },
}

/// All live palm-hold sessions
#[derive(Debug, Clone)]
pub struct GestureSessions {
    scope: GestureScope,
    shared: GestureState,
    per_trip: HashMap<String, Instant>,
}

impl GestureSessions {
    pub fn new(scope: GestureScope) -> Self {
        Self {
            scope,
            shared: GestureState::Closed,
            per_trip: HashMap::new(),
        }
    }

    pub fn scope(&self) -> GestureScope {
        self.scope
    }

    /// Apply one palm observation for `trip`.
    ///
    /// Returns how long the palm has been held, or `None` when it is closed.
    /// A hold that just started (or was taken over by another trip) reports zero.
    pub fn observe(&mut self, trip: &str, palm_open: bool, now: Instant) -> Option<Duration> {
        match self.scope {
            GestureScope::Shared => {
                if !palm_open {
                    self.shared = GestureState::Closed;
                    return None;
                }
                match &self.shared {
                    GestureState::Open { since, owner } if owner == trip => {
                        Some(now.saturating_duration_since(*since))
                    }
                    _ => {
                        self.shared = GestureState::Open {
                            since: now,
                            owner: trip.to_string(),
                        };
                        Some(Duration::ZERO)
                    }
                }
            }
            GestureScope::PerTrip => {
                if !palm_open {
                    self.per_trip.remove(trip);
                    return None;
                }
                let since = *self.per_trip.entry(trip.to_string()).or_insert(now);
                Some(now.saturating_duration_since(since))
            }
        }
    }

    /// Drop any hold owned by `trip`
    pub fn forget(&mut self, trip: &str) {
        match self.scope {
            GestureScope::Shared => {
                if matches!(&self.shared, GestureState::Open { owner, .. } if owner == trip) {
                    self.shared = GestureState::Closed;
                }
            }
            GestureScope::PerTrip => {
                self.per_trip.remove(trip);
            }
        }
    }

    /// Whether `trip` currently holds an open palm
    pub fn is_open(&self, trip: &str) -> bool {
        match self.scope {
            GestureScope::Shared => {
                matches!(&self.shared, GestureState::Open { owner, .. } if owner == trip)
            }
            GestureScope::PerTrip => self.per_trip.contains_key(trip),
        }
    }
}
