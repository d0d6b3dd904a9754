//! Custom error types for the sweep engine.
//!
//! This module defines the primary error type, `SweepError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures a sweep can
//! encounter, from bad set-point values to instrument I/O and storage issues.
//!
//! ## Error Hierarchy
//!
//! `SweepError` consolidates four failure domains:
//!
//! - **`Validation`**: A candidate value was rejected by a parameter's
//!   validator. These are never retried and are surfaced immediately to the
//!   caller of `set`; the underlying instrument write is never invoked.
//! - **`Communication`**: An instrument read or write failed. Depending on the
//!   configured policy these are retried with backoff, recovered per-cell
//!   (fail-forward), or escalated to abort the run.
//! - **`Overwrite`**: A dataset cell that already holds a finalized value was
//!   written again without the explicit rerun entry point. This is a
//!   programming error and always surfaced.
//! - **`Formatter`**: Serialization to disk failed. Flushes are retried on the
//!   next cycle with data held in memory; repeated failure aborts the run.
//!
//! Lifecycle misuse (`InvalidState`, `ReadOnly`) and configuration problems
//! round out the taxonomy. By using `#[from]`, `SweepError` can be seamlessly
//! created from underlying error types with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type SweepResult<T> = std::result::Result<T, SweepError>;

/// Primary error type for the sweep engine and dataset store.
#[derive(Error, Debug)]
pub enum SweepError {
    /// A candidate value was rejected by a parameter validator.
    ///
    /// **Error Type**: Permanent - indicates invalid input data.
    ///
    /// **Recovery Strategy**: Never retried. Fix the set-point or the
    /// validator; the instrument write was not invoked.
    #[error("Validation failed for parameter '{parameter}': {reason}")]
    Validation {
        /// Parameter that rejected the value.
        parameter: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Instrument communication failed.
    ///
    /// **Error Type**: May be transient (glitch) or permanent (device
    /// unplugged).
    ///
    /// **Recovery Strategy**: Retried up to the configured attempt count with
    /// backoff. On exhaustion the engine either marks the cell as failed and
    /// continues, or aborts the run, per [`crate::config::CommErrorPolicy`].
    #[error("Communication error after {attempts} attempt(s): {source_msg}")]
    Communication {
        /// Description of the underlying I/O failure.
        source_msg: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A finalized dataset cell was written twice.
    ///
    /// **Error Type**: Permanent - programming error.
    ///
    /// **Recovery Strategy**: Always surfaced. Use
    /// [`crate::dataset::DataSet::rewrite`] when a partial rerun genuinely
    /// needs to replace a cell.
    #[error("Cell {index} of array '{array}' already holds a value")]
    Overwrite {
        /// Array whose cell was double-written.
        array: String,
        /// Linear (row-major) index of the cell.
        index: usize,
    },

    /// Serializing dataset contents to disk failed.
    #[error("Formatter error: {0}")]
    Formatter(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file or environment parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Semantic error in configuration values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// An operation was attempted in the wrong lifecycle state.
    ///
    /// Examples: running an `ActiveLoop` twice, flushing a dataset that was
    /// never compiled, resuming a completed run.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Write attempted on a finalized dataset or a read-only parameter.
    #[error("Target is read-only: {0}")]
    ReadOnly(String),

    /// A dataset array name did not resolve.
    #[error("Unknown array '{0}'")]
    UnknownArray(String),

    /// A coordinate did not match the array shape.
    #[error("Coordinate {coordinate:?} does not fit array '{array}' of shape {shape:?}")]
    ShapeMismatch {
        /// Array being addressed.
        array: String,
        /// Offending coordinate.
        coordinate: Vec<usize>,
        /// Shape of the array.
        shape: Vec<usize>,
    },

    /// The run was aborted by an external signal.
    #[error("Run aborted: {0}")]
    Aborted(String),

    /// Required feature not enabled at compile time.
    ///
    /// **Recovery Strategy**: Rebuild with the named feature flag, e.g.
    /// `cargo build --features storage_csv`.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl SweepError {
    /// Shorthand for a single-attempt communication failure.
    pub fn comm(msg: impl Into<String>) -> Self {
        SweepError::Communication {
            source_msg: msg.into(),
            attempts: 1,
        }
    }

    /// True for failures that the engine may recover per-cell.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SweepError::Communication { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SweepError::Validation {
            parameter: "gate_voltage".into(),
            reason: "5 not in [-1, 1]".into(),
        };
        assert_eq!(
            err.to_string(),
            "Validation failed for parameter 'gate_voltage': 5 not in [-1, 1]"
        );
    }

    #[test]
    fn test_overwrite_display() {
        let err = SweepError::Overwrite {
            array: "lockin_x".into(),
            index: 7,
        };
        assert!(err.to_string().contains("lockin_x"));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SweepError::comm("timeout").is_recoverable());
        assert!(!SweepError::ReadOnly("dataset".into()).is_recoverable());
    }
}
