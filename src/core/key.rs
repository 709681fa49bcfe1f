//! Transition keys returned by state actions.
//!
//! A key is the small value an action hands back to the engine so it can
//! pick the next state. Keys are either booleans or integers; negative
//! integers are reserved to mean "exhausted".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value returned by an action and matched against a state's transitions.
///
/// # Example
///
/// ```rust
/// use scenario_harness::core::{Key, KeyKind};
///
/// assert_eq!(Key::from(true).kind(), KeyKind::Boolean);
/// assert_eq!(Key::from(3).as_number(), Some(3));
/// assert!(Key::EXHAUSTED.is_exhausted());
/// assert!(!Key::from(0).is_exhausted());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Bool(bool),
    Int(i64),
}

/// Broad category of a key, used to validate guard transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Boolean,
    Numeric,
}

impl Key {
    /// Sentinel returned when a countdown has run out.
    pub const EXHAUSTED: Key = Key::Int(-1);

    /// Numeric value of the key, or `None` for booleans.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(_) => None,
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Bool(_) => KeyKind::Boolean,
            Self::Int(_) => KeyKind::Numeric,
        }
    }

    /// True for the reserved negative sentinel range.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Int(value) if *value < 0)
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Numeric => f.write_str("numeric"),
        }
    }
}
