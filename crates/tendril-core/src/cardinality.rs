//! Cardinality constraints on relationship descriptors
//!
//! The state tracked per (source instance, relationship) is just the number
//! of connected endpoints. Connect and disconnect are transitions on that
//! count; `validate_existing` checks a count that is already stored.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    ZeroOrMore,
    OneOrMore,
    ZeroOrOne,
    One,
}

impl Cardinality {
    /// Minimum number of connections a saved instance must keep
    pub fn min(&self) -> usize {
        match self {
            Cardinality::ZeroOrMore | Cardinality::ZeroOrOne => 0,
            Cardinality::OneOrMore | Cardinality::One => 1,
        }
    }

    /// Maximum number of connections, `None` when unbounded
    pub fn max(&self) -> Option<usize> {
        match self {
            Cardinality::ZeroOrOne | Cardinality::One => Some(1),
            Cardinality::ZeroOrMore | Cardinality::OneOrMore => None,
        }
    }

    pub fn is_constrained(&self) -> bool {
        *self != Cardinality::ZeroOrMore
    }

    pub fn admits(&self, count: usize) -> bool {
        count >= self.min() && self.max().map_or(true, |max| count <= max)
    }

    /// Transition for one more connection; returns the new count
    pub fn check_connect(&self, relationship: &str, current: usize) -> Result<usize> {
        if let Some(max) = self.max() {
            if current >= max {
                return Err(Error::AttemptedCardinalityViolation {
                    relationship: relationship.to_string(),
                    message: format!(
                        "{} allows at most {} connection(s), {} already present",
                        self, max, current
                    ),
                });
            }
        }
        Ok(current + 1)
    }

    /// Transition for one fewer connection; returns the new count
    pub fn check_disconnect(&self, relationship: &str, current: usize) -> Result<usize> {
        let next = current.saturating_sub(1);
        if next < self.min() {
            return Err(Error::AttemptedCardinalityViolation {
                relationship: relationship.to_string(),
                message: format!(
                    "{} requires at least {} connection(s); use reconnect to replace it",
                    self,
                    self.min()
                ),
            });
        }
        Ok(next)
    }

    /// Report stored data that already breaks the constraint
    pub fn validate_existing(&self, relationship: &str, count: usize) -> Result<()> {
        if self.admits(count) {
            return Ok(());
        }
        Err(Error::CardinalityViolation {
            relationship: relationship.to_string(),
            message: format!("{} but {} connection(s) are stored", self, count),
        })
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cardinality::ZeroOrMore => "ZeroOrMore",
            Cardinality::OneOrMore => "OneOrMore",
            Cardinality::ZeroOrOne => "ZeroOrOne",
            Cardinality::One => "One",
        };
        f.write_str(s)
    }
}
