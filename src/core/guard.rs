//! Relational guard predicates used as transition matchers.
//!
//! A guard starts out unspecialized and must be given exactly one relation
//! and threshold before it can be evaluated. Guards only ever compare
//! numeric keys.

use super::error::ConfigurationError;
use super::key::Key;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relational operator applied as `key <op> threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl Relation {
    /// Apply the relation to `lhs` and `rhs`.
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::GreaterThan => lhs > rhs,
            Self::GreaterOrEqual => lhs >= rhs,
            Self::LessThan => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }
}

/// Deferred relational test over numeric keys.
///
/// Guards are evaluated in transition order; the first satisfied matcher
/// decides the next state. An unspecialized guard refuses to answer.
///
/// # Example
///
/// ```rust
/// use scenario_harness::core::{Guard, Key, Relation};
///
/// let mut guard = Guard::new();
/// assert!(guard.matches(&Key::from(1)).is_err());
///
/// guard.specialize(Relation::GreaterThan, 0).unwrap();
/// assert!(guard.matches(&Key::from(1)).unwrap());
/// assert!(!guard.matches(&Key::from(0)).unwrap());
/// assert!(!guard.matches(&Key::from(-1)).unwrap());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    test: Option<(Relation, i64)>,
}

impl Guard {
    /// Create an unspecialized guard.
    pub fn new() -> Self {
        Self { test: None }
    }

    /// Create a guard already specialized with `relation` and `threshold`.
    pub fn specialized(relation: Relation, threshold: i64) -> Self {
        Self {
            test: Some((relation, threshold)),
        }
    }

    pub fn greater_than(threshold: i64) -> Self {
        Self::specialized(Relation::GreaterThan, threshold)
    }

    pub fn greater_or_equal(threshold: i64) -> Self {
        Self::specialized(Relation::GreaterOrEqual, threshold)
    }

    pub fn less_than(threshold: i64) -> Self {
        Self::specialized(Relation::LessThan, threshold)
    }

    pub fn less_or_equal(threshold: i64) -> Self {
        Self::specialized(Relation::LessOrEqual, threshold)
    }

    pub fn equal_to(threshold: i64) -> Self {
        Self::specialized(Relation::Equal, threshold)
    }

    pub fn not_equal_to(threshold: i64) -> Self {
        Self::specialized(Relation::NotEqual, threshold)
    }

    /// Specialize an unspecialized guard.
    ///
    /// A guard carries exactly one relation, so specializing twice is a
    /// configuration error and leaves the existing relation in place.
    pub fn specialize(
        &mut self,
        relation: Relation,
        threshold: i64,
    ) -> Result<(), ConfigurationError> {
        if self.test.is_some() {
            return Err(ConfigurationError::GuardAlreadySpecialized {
                existing: self.to_string(),
            });
        }
        self.test = Some((relation, threshold));
        Ok(())
    }

    pub fn is_specialized(&self) -> bool {
        self.test.is_some()
    }

    /// The relation and threshold, once specialized.
    pub fn relation(&self) -> Option<(Relation, i64)> {
        self.test
    }

    /// Evaluate `key <relation> threshold`.
    ///
    /// Fails for an unspecialized guard and for boolean keys.
    pub fn matches(&self, key: &Key) -> Result<bool, ConfigurationError> {
        let (relation, threshold) = self.test.ok_or(ConfigurationError::UnspecializedGuard)?;
        let value = key
            .as_number()
            .ok_or(ConfigurationError::NonNumericKey { key: *key })?;
        Ok(relation.apply(value, threshold))
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.test {
            Some((relation, threshold)) => write!(f, "{} {}", relation.symbol(), threshold),
            None => f.write_str("<unspecialized>"),
        }
    }
}
