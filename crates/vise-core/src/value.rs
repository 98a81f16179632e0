//! Attribute values and the blend operator.
//!
//! Every attribute slot holds a [`Value`]: no information yet (`Unknown`), a
//! point estimate (`Scalar`), or a closed interval (`Interval`). Interval
//! arithmetic lives on [`Interval`]; mixed-kind dispatch and error handling
//! live in the evaluator.
//!
//! JSON shapes (also accepted on the way in, plus the `[lo, hi]` shorthand):
//!
//! ```text
//! 0.7                                    scalar
//! {"kind":"interval","lo":0.3,"hi":0.5}  interval
//! {"kind":"unknown","hint":"infer"}      unknown
//! ```

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed numeric interval. Constructed via [`Interval::new`], which swaps
/// inverted bounds so `lo <= hi` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        if lo > hi {
            Interval { lo: hi, hi: lo }
        } else {
            Interval { lo, hi }
        }
    }

    /// Degenerate interval at a point.
    pub fn point(x: f64) -> Self {
        Interval { lo: x, hi: x }
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn add(&self, other: &Interval) -> Interval {
        Interval::new(self.lo + other.lo, self.hi + other.hi)
    }

    /// Cross difference of bounds: the tightest interval containing
    /// `a - b` for all `a` in `self`, `b` in `other`.
    pub fn sub(&self, other: &Interval) -> Interval {
        Interval::new(self.lo - other.hi, self.hi - other.lo)
    }

    pub fn mul(&self, other: &Interval) -> Interval {
        let corners = [
            self.lo * other.lo,
            self.lo * other.hi,
            self.hi * other.lo,
            self.hi * other.hi,
        ];
        let mut lo = corners[0];
        let mut hi = corners[0];
        for c in &corners[1..] {
            lo = lo.min(*c);
            hi = hi.max(*c);
        }
        Interval::new(lo, hi)
    }

    pub fn shift(&self, x: f64) -> Interval {
        Interval::new(self.lo + x, self.hi + x)
    }

    /// Sign-aware scaling: a negative factor flips the bounds.
    pub fn scale(&self, k: f64) -> Interval {
        Interval::new((self.lo * k).min(self.hi * k), (self.lo * k).max(self.hi * k))
    }
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unknown { hint: Option<String> },
    Scalar(f64),
    Interval(Interval),
}

impl Value {
    pub fn unknown() -> Self {
        Value::Unknown { hint: None }
    }

    pub fn unknown_with(hint: impl Into<String>) -> Self {
        Value::Unknown {
            hint: Some(hint.into()),
        }
    }

    pub fn interval(lo: f64, hi: f64) -> Self {
        Value::Interval(Interval::new(lo, hi))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown { .. })
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    /// Promote to an interval: scalars become degenerate intervals, unknowns
    /// have no interval reading.
    pub fn as_interval(&self) -> Option<Interval> {
        match self {
            Value::Interval(iv) => Some(*iv),
            Value::Scalar(x) => Some(Interval::point(*x)),
            Value::Unknown { .. } => None,
        }
    }

    /// Multiply by a scalar factor, preserving the value kind. Unknown stays
    /// unknown.
    pub fn scale(&self, k: f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(x * k),
            Value::Interval(iv) => Value::Interval(iv.scale(k)),
            Value::Unknown { .. } => self.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown { hint: None } => write!(f, "unknown"),
            Value::Unknown { hint: Some(h) } => write!(f, "unknown({h})"),
            Value::Scalar(x) => write!(f, "{x}"),
            Value::Interval(iv) => write!(f, "[{}, {}]", iv.lo, iv.hi),
        }
    }
}

/// Confidence-weighted interpolation between the current value and a freshly
/// computed target. The single place values move under constraint pressure.
///
/// - `Unknown` adopts the target outright (first write wins, no averaging).
/// - If either side is an interval, both are promoted and the bounds are
///   interpolated independently.
/// - Two scalars interpolate linearly.
///
/// Strength 1.0 is a hard overwrite, 0.0 a no-op.
pub fn blend(old: &Value, target: &Value, strength: f64) -> Value {
    let lerp = |o: Interval, t: Interval| {
        Value::Interval(Interval::new(
            (1.0 - strength) * o.lo + strength * t.lo,
            (1.0 - strength) * o.hi + strength * t.hi,
        ))
    };
    match (old, target) {
        (Value::Unknown { .. }, t) => t.clone(),
        (o, Value::Unknown { .. }) => o.clone(),
        (Value::Scalar(a), Value::Scalar(b)) => {
            Value::Scalar((1.0 - strength) * a + strength * b)
        }
        (Value::Interval(a), Value::Interval(b)) => lerp(*a, *b),
        (Value::Interval(a), Value::Scalar(b)) => lerp(*a, Interval::point(*b)),
        (Value::Scalar(a), Value::Interval(b)) => lerp(Interval::point(*a), *b),
    }
}

// ============================================================================
// Serde façade
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TaggedValue {
    Unknown {
        #[serde(default)]
        hint: Option<String>,
    },
    Scalar {
        x: f64,
    },
    Interval {
        lo: f64,
        hi: f64,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Number(f64),
    Pair([f64; 2]),
    Tagged(TaggedValue),
    Null(()),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(x) => serializer.serialize_f64(*x),
            Value::Interval(iv) => TaggedValue::Interval {
                lo: iv.lo,
                hi: iv.hi,
            }
            .serialize(serializer),
            Value::Unknown { hint } => TaggedValue::Unknown { hint: hint.clone() }.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ValueRepr::deserialize(deserializer)? {
            ValueRepr::Number(x) => Value::Scalar(x),
            ValueRepr::Pair([lo, hi]) => Value::interval(lo, hi),
            ValueRepr::Tagged(TaggedValue::Unknown { hint }) => Value::Unknown { hint },
            ValueRepr::Tagged(TaggedValue::Scalar { x }) => Value::Scalar(x),
            ValueRepr::Tagged(TaggedValue::Interval { lo, hi }) => Value::interval(lo, hi),
            ValueRepr::Null(()) => Value::unknown(),
        })
    }
}
