//! Validators - pure predicates over candidate parameter values.
//!
//! A validator decides whether a value is acceptable for a parameter before
//! it is forwarded to the instrument. Validators are side-effect free and
//! reusable across parameters: the same `Validator::range(0.0, 10.0)` can
//! guard any number of voltage sources.
//!
//! Variants are modeled as a tagged enum so they can be inspected and
//! summarized into run metadata without dynamic dispatch:
//!
//! - [`Validator::Range`] - inclusive numeric bounds
//! - [`Validator::Choices`] - enumerated set of allowed values
//! - [`Validator::AnyOf`] - composite, accepts when any member accepts
//! - [`Validator::None`] - accepts everything

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};

/// Acceptance predicate for candidate parameter values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Validator<T> {
    /// All values accepted.
    None,

    /// Inclusive numeric range constraint.
    ///
    /// Values must satisfy `min <= value <= max`. Commonly used for voltages,
    /// positions, and power levels.
    Range {
        /// Minimum allowed value (inclusive).
        min: T,
        /// Maximum allowed value (inclusive).
        max: T,
    },

    /// Discrete choice constraint.
    ///
    /// Value must match one of the provided choices exactly. Useful for
    /// enumerated settings like filter slots or trigger modes.
    Choices(Vec<T>),

    /// Composite either-of constraint.
    ///
    /// Accepts a value when any member validator accepts it, e.g. a range
    /// plus a sentinel "off" value.
    AnyOf(Vec<Validator<T>>),
}

impl<T> Default for Validator<T> {
    fn default() -> Self {
        Validator::None
    }
}

impl<T: PartialOrd + PartialEq + Clone + Debug> Validator<T> {
    /// Validate a candidate value for the named parameter.
    ///
    /// Returns [`SweepError::Validation`] when the value is outside the
    /// accepted domain. Pure: no caches, no instrument traffic.
    pub fn validate(&self, parameter: &str, value: &T) -> SweepResult<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(SweepError::Validation {
                parameter: parameter.to_string(),
                reason: format!("{:?} not accepted by {}", value, self.summary()),
            })
        }
    }

    /// Pure acceptance check without error construction.
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Validator::None => true,
            Validator::Range { min, max } => value >= min && value <= max,
            Validator::Choices(choices) => choices.iter().any(|c| c == value),
            Validator::AnyOf(members) => members.iter().any(|v| v.accepts(value)),
        }
    }

    /// Human-readable summary for metadata capture.
    pub fn summary(&self) -> String {
        match self {
            Validator::None => "any".to_string(),
            Validator::Range { min, max } => format!("range [{:?}, {:?}]", min, max),
            Validator::Choices(choices) => format!("choices {:?}", choices),
            Validator::AnyOf(members) => {
                let parts: Vec<String> = members.iter().map(|v| v.summary()).collect();
                format!("any of ({})", parts.join(" | "))
            }
        }
    }
}

impl<T> Validator<T> {
    /// Inclusive numeric range constraint.
    pub fn range(min: T, max: T) -> Self {
        Validator::Range { min, max }
    }

    /// Discrete choice constraint.
    pub fn choices(choices: impl Into<Vec<T>>) -> Self {
        Validator::Choices(choices.into())
    }

    /// Composite either-of constraint.
    pub fn any_of(members: impl Into<Vec<Validator<T>>>) -> Self {
        Validator::AnyOf(members.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation() {
        let v = Validator::range(0.0, 100.0);
        assert!(v.validate("exposure", &50.0).is_ok());
        assert!(v.validate("exposure", &0.0).is_ok());
        assert!(v.validate("exposure", &100.0).is_ok());
        assert!(v.validate("exposure", &150.0).is_err());
        assert!(v.validate("exposure", &-10.0).is_err());
    }

    #[test]
    fn test_choices_validation() {
        let v = Validator::choices(vec![1.0, 2.0, 5.0]);
        assert!(v.validate("gain", &2.0).is_ok());
        assert!(v.validate("gain", &3.0).is_err());
    }

    #[test]
    fn test_any_of_validation() {
        // A range plus a sentinel "off" value.
        let v = Validator::any_of(vec![
            Validator::range(400.0, 1000.0),
            Validator::choices(vec![0.0]),
        ]);
        assert!(v.validate("wavelength", &532.0).is_ok());
        assert!(v.validate("wavelength", &0.0).is_ok());
        assert!(v.validate("wavelength", &10.0).is_err());
    }

    #[test]
    fn test_none_accepts_everything() {
        let v: Validator<f64> = Validator::None;
        assert!(v.validate("anything", &f64::MAX).is_ok());
    }

    #[test]
    fn test_validation_error_names_parameter() {
        let v = Validator::range(-1.0, 1.0);
        let err = v.validate("gate_voltage", &5.0).unwrap_err();
        assert!(err.to_string().contains("gate_voltage"));
    }

    #[test]
    fn test_summary_is_descriptive() {
        let v = Validator::range(0, 10);
        assert_eq!(v.summary(), "range [0, 10]");
    }
}
