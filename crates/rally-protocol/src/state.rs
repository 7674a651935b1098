//! Player transform state and its coercion rules.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::messages::StateFields;

/// Animation name used when a client sends none.
pub const DEFAULT_ANIM: &str = "idle";

/// Chapter used when a client sends none, or a zero.
pub const DEFAULT_CHAPTER: f64 = 1.0;

/// Last known transform of a party member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    #[serde(serialize_with = "serialize_chapter")]
    pub chap: f64,
    pub anim: String,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            chap: DEFAULT_CHAPTER,
            anim: DEFAULT_ANIM.to_string(),
        }
    }
}

impl PlayerState {
    /// Build a state from raw client fields.
    ///
    /// Numeric fields that are absent or not numeric become `0`. `chap`
    /// falls back to `1` when it coerces to zero; any other value, negative
    /// or fractional included, is kept as sent. `anim` falls back to
    /// `"idle"` unless it is a non-empty string.
    #[must_use]
    pub fn normalize(fields: &StateFields) -> Self {
        let chap = coerce_number(fields.chap.as_ref());

        Self {
            x: coerce_number(fields.x.as_ref()),
            y: coerce_number(fields.y.as_ref()),
            z: coerce_number(fields.z.as_ref()),
            yaw: coerce_number(fields.yaw.as_ref()),
            pitch: coerce_number(fields.pitch.as_ref()),
            chap: if chap == 0.0 { DEFAULT_CHAPTER } else { chap },
            anim: match fields.anim.as_ref() {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => DEFAULT_ANIM.to_string(),
            },
        }
    }
}

/// Whole chapters are written as JSON integers, anything else as a float.
fn serialize_chapter<S: Serializer>(chap: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    // Below 2^53 every whole f64 converts to i64 exactly.
    if chap.fract() == 0.0 && chap.abs() < 9_007_199_254_740_992.0 {
        serializer.serialize_i64(*chap as i64)
    } else {
        serializer.serialize_f64(*chap)
    }
}

/// Coerce a loosely typed JSON value into a finite number, `0` otherwise.
fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };

    if n.is_finite() {
        n
    } else {
        0.0
    }
}
