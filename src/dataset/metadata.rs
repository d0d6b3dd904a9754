//! Run metadata captured alongside the measurement arrays.
//!
//! Rich metadata is what makes a dataset interpretable months later: which
//! parameters were swept over which grid, in which units, under which
//! validators, and how the run ended. The record is serialized as
//! `metadata.json` inside the dataset location and updated on finalize.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new unique run identifier.
pub fn new_run_uid() -> String {
    Uuid::new_v4().to_string()
}

/// How an array participates in the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKind {
    /// Set-point axis driven by the sweep.
    Swept,
    /// Sample array filled by read actions.
    Measured,
    /// Append stream filled by a background monitor.
    Monitor,
}

/// Completion state of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Still accepting writes.
    Running,
    /// Every sweep point was visited.
    Completed,
    /// Stopped by an external abort signal; data so far is preserved.
    Aborted,
    /// Stopped by an escalated error; data so far is preserved.
    Failed,
}

/// Descriptor for one array of the dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    /// Array name (derived from the parameter name).
    pub name: String,
    /// Physical unit tag.
    pub unit: String,
    /// Array shape, outer-most dimension first.
    pub shape: Vec<usize>,
    /// Summary of the source parameter's validator.
    pub validator: String,
    /// Role of this array in the run.
    pub kind: ArrayKind,
}

/// Metadata record persisted with every dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique run identifier.
    pub run_uid: String,
    /// Dataset name (used in the location directory name).
    pub name: String,
    /// One descriptor per array.
    pub arrays: Vec<ArrayDescriptor>,
    /// Product shape of the sweep, outer-most dimension first.
    pub loop_shape: Vec<usize>,
    /// Delay after each set, in seconds.
    pub delay_s: f64,
    /// Free-form annotations (operator, sample id, ...).
    pub annotations: HashMap<String, String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Completion state.
    pub status: RunStatus,
    /// Abort/failure cause, when status is not `Completed`.
    pub exit_reason: Option<String>,
    /// Version of the acquisition software.
    pub software_version: String,
}

impl RunMetadata {
    /// Fresh metadata for a run that is about to start.
    pub fn new(name: &str, loop_shape: Vec<usize>) -> Self {
        Self {
            run_uid: new_run_uid(),
            name: name.to_string(),
            arrays: Vec::new(),
            loop_shape,
            delay_s: 0.0,
            annotations: HashMap::new(),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            exit_reason: None,
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Attach an array descriptor.
    pub fn with_array(mut self, descriptor: ArrayDescriptor) -> Self {
        self.arrays.push(descriptor);
        self
    }

    /// Attach a free-form annotation.
    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// Record the terminal state of the run.
    pub fn finish(&mut self, status: RunStatus, reason: Option<String>) {
        self.status = status;
        self.exit_reason = reason;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_lifecycle() {
        let mut meta = RunMetadata::new("iv_curve", vec![3, 5]).with_annotation("operator", "kb");
        assert_eq!(meta.status, RunStatus::Running);
        assert!(meta.ended_at.is_none());

        meta.finish(RunStatus::Aborted, Some("user abort".into()));
        assert_eq!(meta.status, RunStatus::Aborted);
        assert_eq!(meta.exit_reason.as_deref(), Some("user abort"));
        assert!(meta.ended_at.is_some());
    }

    #[test]
    fn test_metadata_json_round_trip() {
        let meta = RunMetadata::new("scan", vec![4]).with_array(ArrayDescriptor {
            name: "power".into(),
            unit: "W".into(),
            shape: vec![4],
            validator: "any".into(),
            kind: ArrayKind::Measured,
        });

        let json = serde_json::to_string(&meta).unwrap();
        let back: RunMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}
