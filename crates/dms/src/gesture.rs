//! Open-palm SOS gesture detection

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use frame_input::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::state::GestureSessions;
use crate::{round_to, DmsConfig, DmsError};

const DEFAULT_HOLD: Duration = Duration::from_secs(2);

/// Hand landmark indices (21-point hand model)
pub mod hand_indices {
    pub const WRIST: usize = 0;
    pub const THUMB_BASE: usize = 2;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_BASE: usize = 5;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_BASE: usize = 9;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_BASE: usize = 13;
    pub const RING_TIP: usize = 16;
    pub const PINKY_BASE: usize = 17;
    pub const PINKY_TIP: usize = 20;

    pub const LANDMARK_COUNT: usize = 21;
}

/// Normalized landmark position (y grows downwards)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

pub type HandLandmarks = Vec<Landmark>;

/// Hand landmark backend (one entry per detected hand)
pub trait HandLandmarker: Send + Sync {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<HandLandmarks>, DmsError>;
}

/// Time source for hold durations
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open palm: at least three of the four fingers point up past their
/// knuckles and the thumb sticks out sideways from the wrist.
pub fn is_palm_open(hand: &[Landmark]) -> bool {
    use hand_indices::*;

    if hand.len() < LANDMARK_COUNT {
        return false;
    }

    let fingers_extended = [
        (INDEX_TIP, INDEX_BASE),
        (MIDDLE_TIP, MIDDLE_BASE),
        (RING_TIP, RING_BASE),
        (PINKY_TIP, PINKY_BASE),
    ]
    .iter()
    .filter(|(tip, base)| hand[*tip].y < hand[*base].y)
    .count();

    let wrist = hand[WRIST];
    let thumb_extended = (hand[THUMB_TIP].x - wrist.x).abs() > (hand[THUMB_BASE].x - wrist.x).abs();

    fingers_extended >= 3 && thumb_extended
}

/// SOS gesture result for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SosGesture {
    pub sos_detected: bool,
    pub sos_triggered: bool,
    pub palm_open: bool,
    /// Hold time in seconds (2 decimals)
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hands_detected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SosGesture {
    /// Palm closed, nothing to report
    pub fn closed() -> Self {
        Self::default()
    }

    /// Closed result explaining why no gesture could be evaluated
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Palm-hold state machine around an optional landmark backend
pub struct GestureDetector {
    landmarker: Option<Arc<dyn HandLandmarker>>,
    sessions: Mutex<GestureSessions>,
    clock: Arc<dyn Clock>,
    hold_threshold: Duration,
}

impl GestureDetector {
    pub fn new(config: &DmsConfig) -> Self {
        let hold_threshold = Duration::try_from_secs_f64(config.sos_hold_secs.max(0.0))
            .unwrap_or(DEFAULT_HOLD);
        info!(
            "Gesture detector: hold {:?}, scope {:?}",
            hold_threshold, config.gesture_scope
        );
        Self {
            landmarker: None,
            sessions: Mutex::new(GestureSessions::new(config.gesture_scope)),
            clock: Arc::new(SystemClock),
            hold_threshold,
        }
    }

    pub fn with_landmarker(mut self, landmarker: Arc<dyn HandLandmarker>) -> Self {
        self.landmarker = Some(landmarker);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_available(&self) -> bool {
        self.landmarker.is_some()
    }

    /// Run the landmark backend on `frame` and advance the session for `trip`
    pub fn detect(&self, frame: &VideoFrame, trip: &str) -> SosGesture {
        let Some(landmarker) = &self.landmarker else {
            return SosGesture::with_message("Hand landmark backend not available");
        };

        if frame.is_empty() {
            return SosGesture::closed();
        }

        let hands = match landmarker.detect(frame) {
            Ok(hands) => hands,
            Err(e) => {
                warn!("Hand detection error: {}", e);
                return SosGesture {
                    error: Some(e.to_string()),
                    ..SosGesture::closed()
                };
            }
        };

        let palm_open = hands.iter().any(|hand| is_palm_open(hand));
        SosGesture {
            hands_detected: Some(hands.len()),
            ..self.observe(trip, palm_open)
        }
    }

    /// Advance the session for `trip` with an already-classified palm state
    pub fn observe(&self, trip: &str, palm_open: bool) -> SosGesture {
        let now = self.clock.now();
        let held = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(trip, palm_open, now);

        match held {
            Some(held) => {
                let sos_triggered = held >= self.hold_threshold;
                if sos_triggered {
                    info!("SOS gesture triggered for trip '{}' after {:?}", trip, held);
                } else {
                    debug!("Palm open for trip '{}' ({:?})", trip, held);
                }
                SosGesture {
                    sos_detected: true,
                    sos_triggered,
                    palm_open: true,
                    duration: round_to(held.as_secs_f64(), 2),
                    ..SosGesture::closed()
                }
            }
            None => SosGesture::closed(),
        }
    }

    /// Drop the hold owned by `trip` (trip reset or completed)
    pub fn forget(&self, trip: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forget(trip);
    }
}
