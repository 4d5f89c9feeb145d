//! Typed variable values.
//!
//! A [`Value`] is a tagged union over null, bool, i32, f64 and a short
//! string. Equality follows the store's change-detection rule: same type,
//! and for floats an absolute tolerance of [`FLOAT_EPSILON`].

use core::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::bounded::bounded;
use crate::error::{Error, Result};

/// Capacity of a string value (bytes).
pub const VALUE_STRING_MAX: usize = 128;

/// Absolute tolerance used when comparing float values.
pub const FLOAT_EPSILON: f64 = 1e-4;

pub type ShortString = heapless::String<VALUE_STRING_MAX>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(ShortString),
}

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    Str,
}

impl PartialEq for Value {
    /// Two values are equal when they have the same type and, for floats,
    /// differ by less than [`FLOAT_EPSILON`].
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => (a - b).abs() < FLOAT_EPSILON,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// String value, truncated to [`VALUE_STRING_MAX`].
    pub fn text(s: &str) -> Self {
        Self::Str(bounded(s))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
        }
    }

    /// Zero value of a type (`""`, `0`, `0.0`, `false`).
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::Null => Self::Null,
            ValueType::Bool => Self::Bool(false),
            ValueType::Int => Self::Int(0),
            ValueType::Float => Self::Float(0.0),
            ValueType::Str => Self::Str(ShortString::new()),
        }
    }

    /// Int (non-zero) and float (non-zero) coerce; strings and null don't.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            Self::Float(f) => Ok(*f != 0.0),
            _ => Err(Error::IncompatibleType),
        }
    }

    /// Floats truncate toward zero; bools give 0/1.
    pub fn as_int(&self) -> Result<i32> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Float(f) => Ok(*f as i32),
            Self::Bool(b) => Ok(i32::from(*b)),
            _ => Err(Error::IncompatibleType),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Self::Float(f) => Ok(*f),
            Self::Int(i) => Ok(f64::from(*i)),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            _ => Err(Error::IncompatibleType),
        }
    }

    /// Text form: ints as `%d`, floats as `%.2f`, bools as `true`/`false`,
    /// strings as-is, null as the empty string.
    pub fn to_text(&self) -> ShortString {
        match self {
            Self::Null => ShortString::new(),
            Self::Bool(b) => bounded(if *b { "true" } else { "false" }),
            Self::Int(i) => {
                let mut out = ShortString::new();
                let _ = write!(out, "{}", i);
                out
            }
            Self::Float(f) => {
                // Overflowing the buffer leaves a truncated number, same as snprintf.
                let mut out = ShortString::new();
                let _ = write!(out, "{:.2}", f);
                out
            }
            Self::Str(s) => s.clone(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}
