//! Engine configuration.
//!
//! Policies that tune a run without touching code: what to do when an
//! instrument stops answering, how often to flush, how large subscriber
//! queues are. Loaded with `figment` from an optional TOML file plus
//! `SWEEP_DAQ_`-prefixed environment variables, so a long-running rig can be
//! reconfigured per-experiment without rebuilds.
//!
//! ```toml
//! # sweep_daq.toml
//! data_root = "/data/runs"
//! on_comm_error = "fail_forward"
//! flush_every_points = 16
//!
//! [retry]
//! max_attempts = 3
//! backoff = "100ms"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};

/// What the engine does when instrument communication fails after retries.
///
/// The choice is deliberately a configuration option: overnight sweeps on
/// flaky hardware want `FailForward`, short calibration runs usually want
/// `Abort` so a broken cable is noticed immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommErrorPolicy {
    /// Mark the cell as failed (sentinel) and continue with the next point.
    FailForward,
    /// Abort the run, flushing everything gathered so far.
    Abort,
}

/// Retry policy for instrument communication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay between attempts.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Top-level configuration for sweeps, datasets, and monitors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Root directory under which dataset locations are created.
    pub data_root: PathBuf,

    /// Policy for exhausted communication retries.
    pub on_comm_error: CommErrorPolicy,

    /// Retry policy for instrument communication.
    pub retry: RetryPolicy,

    /// Flush the dataset after this many completed sweep points.
    pub flush_every_points: usize,

    /// Abort the run after this many consecutive failed flushes.
    ///
    /// A failed flush leaves its data in memory and is retried on the next
    /// cycle, so a transient disk hiccup does not cost the sweep.
    pub max_flush_failures: u32,

    /// Bounded queue depth per dataset subscriber.
    pub subscriber_capacity: usize,

    /// Preallocated sample capacity for each monitor array.
    pub monitor_capacity: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            on_comm_error: CommErrorPolicy::FailForward,
            retry: RetryPolicy::default(),
            flush_every_points: 16,
            max_flush_failures: 3,
            subscriber_capacity: 64,
            monitor_capacity: 4096,
        }
    }
}

impl SweepConfig {
    /// Load configuration from `sweep_daq.toml` (if present) merged with
    /// `SWEEP_DAQ_*` environment variables. Environment wins.
    pub fn load() -> SweepResult<Self> {
        Self::from_file("sweep_daq.toml")
    }

    /// Load configuration from an explicit TOML path merged with
    /// `SWEEP_DAQ_*` environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> SweepResult<Self> {
        let config: SweepConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SWEEP_DAQ_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what parsing catches.
    pub fn validate(&self) -> SweepResult<()> {
        if self.flush_every_points == 0 {
            return Err(SweepError::Configuration(
                "flush_every_points must be at least 1".into(),
            ));
        }
        if self.max_flush_failures == 0 {
            return Err(SweepError::Configuration(
                "max_flush_failures must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SweepError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.subscriber_capacity == 0 {
            return Err(SweepError::Configuration(
                "subscriber_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SweepConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.on_comm_error, CommErrorPolicy::FailForward);
    }

    #[test]
    fn test_load_from_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "sweep_daq.toml",
                r#"
                data_root = "/tmp/runs"
                on_comm_error = "abort"
                flush_every_points = 4

                [retry]
                max_attempts = 5
                backoff = "250ms"
                "#,
            )?;

            let config = SweepConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.data_root, PathBuf::from("/tmp/runs"));
            assert_eq!(config.on_comm_error, CommErrorPolicy::Abort);
            assert_eq!(config.flush_every_points, 4);
            assert_eq!(config.retry.max_attempts, 5);
            assert_eq!(config.retry.backoff, Duration::from_millis(250));
            // Unspecified fields keep their defaults.
            assert_eq!(config.subscriber_capacity, 64);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "sweep_daq.toml",
                r#"
                monitor_capacity = 128

                [retry]
                max_attempts = 2
                "#,
            )?;
            jail.set_env("SWEEP_DAQ_MONITOR_CAPACITY", "512");
            // Double underscore descends into the nested retry table.
            jail.set_env("SWEEP_DAQ_RETRY__MAX_ATTEMPTS", "9");
            jail.set_env("SWEEP_DAQ_ON_COMM_ERROR", "abort");

            let config = SweepConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.monitor_capacity, 512);
            assert_eq!(config.retry.max_attempts, 9);
            assert_eq!(config.on_comm_error, CommErrorPolicy::Abort);
            // Env backoff untouched: TOML/default value survives the merge.
            assert_eq!(config.retry.backoff, Duration::from_millis(100));
            Ok(())
        });
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let config = SweepConfig {
            flush_every_points: 0,
            ..SweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SweepError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = SweepConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: SweepConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
