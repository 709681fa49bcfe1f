//! Transition matchers and first-match resolution.

use super::error::ConfigurationError;
use super::guard::Guard;
use super::key::Key;
use super::state::StateId;
use std::fmt;

/// Test deciding whether a transition fires for a returned key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Fires when the key equals this value.
    Exact(Key),
    /// Fires when the guard's relation holds for the key.
    Guard(Guard),
}

impl Matcher {
    pub fn exact(key: impl Into<Key>) -> Self {
        Self::Exact(key.into())
    }

    pub fn guard(guard: Guard) -> Self {
        Self::Guard(guard)
    }

    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Guard(_))
    }

    /// Check the key against this matcher.
    ///
    /// Exact matchers never fail: a key of a different kind simply does not
    /// match. Guard matchers fail on boolean keys and when unspecialized.
    pub fn matches(&self, key: &Key) -> Result<bool, ConfigurationError> {
        match self {
            Self::Exact(expected) => Ok(expected == key),
            Self::Guard(guard) => guard.matches(key),
        }
    }
}

impl From<Guard> for Matcher {
    fn from(guard: Guard) -> Self {
        Self::Guard(guard)
    }
}

impl From<Key> for Matcher {
    fn from(key: Key) -> Self {
        Self::Exact(key)
    }
}

impl From<bool> for Matcher {
    fn from(value: bool) -> Self {
        Self::Exact(Key::from(value))
    }
}

impl From<i64> for Matcher {
    fn from(value: i64) -> Self {
        Self::Exact(Key::from(value))
    }
}

impl From<i32> for Matcher {
    fn from(value: i32) -> Self {
        Self::Exact(Key::from(value))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "== {key}"),
            Self::Guard(guard) => write!(f, "{guard}"),
        }
    }
}

/// One entry of a state's ordered transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub matcher: Matcher,
    pub target: StateId,
}

/// Return the target of the first transition whose matcher accepts `key`.
///
/// Entries are tried strictly in registration order. `Ok(None)` means no
/// entry matched; an error from a matcher stops the scan immediately.
pub fn first_match(
    transitions: &[Transition],
    key: &Key,
) -> Result<Option<StateId>, ConfigurationError> {
    for transition in transitions {
        if transition.matcher.matches(key)? {
            return Ok(Some(transition.target));
        }
    }
    Ok(None)
}
