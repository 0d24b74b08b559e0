//! Request payload interpretation
//!
//! Payloads are loose JSON objects. Fields are looked up leniently and
//! numbers are coerced rather than rejected.

use dms::RawScores;
use serde_json::{Map, Value};

/// How the frame content was supplied
#[derive(Debug, Clone, PartialEq)]
pub enum FrameInput {
    /// Base64 image, optionally `data:` URI prefixed
    Image(String),
    /// Scores computed by an external detector
    Signals(RawScores),
}

/// One analysis request
#[derive(Debug, Clone, PartialEq)]
pub struct FramePayload {
    pub trip_id: Option<String>,
    pub input: FrameInput,
    /// Vehicle speed (km/h), never negative
    pub speed: f64,
    pub speed_limit: Option<f64>,
    pub frame_id: Value,
    pub video_id: Value,
    pub input_type: Option<String>,
}

const SCORE_FLAGS: [(&str, &str); 3] = [
    ("eyes_closed_score", "drowsiness"),
    ("head_off_road_score", "distraction"),
    ("yawning_score", "yawning"),
];

/// Number, numeric string or boolean as `f64`; anything else is 0
pub fn coerce_f64(value: &Value) -> f64 {
    let number = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FramePayload {
    /// Interpret a JSON body; anything that is not an object reads as empty
    pub fn from_json(body: &Value) -> Self {
        let empty = Map::new();
        let root = body.as_object().unwrap_or(&empty);
        let nested = |key: &str| root.get(key).and_then(Value::as_object);
        let signal = nested("signal");
        let metrics = nested("metrics");

        // signal, then metrics, then top level
        let lookup = |key: &str| {
            signal
                .and_then(|m| m.get(key))
                .or_else(|| metrics.and_then(|m| m.get(key)))
                .or_else(|| root.get(key))
                .filter(|v| !v.is_null())
        };

        let image = non_empty_str(root.get("image")).or_else(|| non_empty_str(root.get("frame")));
        let input = match image {
            Some(data) => FrameInput::Image(data),
            None => {
                let [eyes, head, yawning] = SCORE_FLAGS.map(|(score, flag)| match lookup(score) {
                    Some(value) => coerce_f64(value),
                    None => {
                        let raised = signal
                            .and_then(|m| m.get(flag))
                            .or_else(|| root.get(flag))
                            .is_some_and(truthy);
                        if raised {
                            1.0
                        } else {
                            0.0
                        }
                    }
                });
                FrameInput::Signals(RawScores::new(eyes, head, yawning))
            }
        };

        Self {
            trip_id: non_empty_str(root.get("trip_id")),
            input,
            speed: lookup("speed").map(coerce_f64).unwrap_or(0.0).max(0.0),
            speed_limit: lookup("speed_limit").map(coerce_f64).filter(|l| *l > 0.0),
            frame_id: root.get("frame_id").cloned().unwrap_or(Value::Null),
            video_id: root.get("video_id").cloned().unwrap_or(Value::Null),
            input_type: root
                .get("input_type")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Counter and gesture key; absent trips share the `""` bucket
    pub fn trip_key(&self) -> &str {
        self.trip_id.as_deref().unwrap_or("")
    }

    pub fn is_image(&self) -> bool {
        matches!(self.input, FrameInput::Image(_))
    }
}
