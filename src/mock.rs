//! Mock instrument for tests, examples, and dry runs.
//!
//! Simulates a multi-channel instrument with in-memory registers, optional
//! response latency, Gaussian-ish readout jitter, and scripted failure
//! injection per channel. [`MockInstrument::parameter`] hands out fully
//! connected [`Parameter`]s, so everything downstream of the hardware
//! callbacks is exercised exactly as with a real driver.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::error::SweepError;
use crate::parameter::Parameter;
use crate::validator::Validator;

#[derive(Default)]
struct MockState {
    registers: HashMap<String, f64>,
    /// Number of completed get calls per channel.
    get_counts: HashMap<String, u64>,
    /// Zero-based get indices that fail, per channel.
    fail_gets: HashMap<String, HashSet<u64>>,
    /// Channels whose every get fails (unplugged).
    dead: HashSet<String>,
}

/// Simulated instrument backing any number of channels.
#[derive(Clone, Default)]
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
    jitter: f64,
}

impl MockInstrument {
    /// Instrument with zero latency and no jitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every get and set.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add uniform noise in `[-amplitude, amplitude]` to every reading.
    pub fn with_jitter(mut self, amplitude: f64) -> Self {
        self.jitter = amplitude;
        self
    }

    /// Directly set a channel register, bypassing any parameter.
    pub fn set_register(&self, channel: &str, value: f64) {
        self.state.lock().registers.insert(channel.to_string(), value);
    }

    /// Current register value of a channel.
    pub fn register(&self, channel: &str) -> Option<f64> {
        self.state.lock().registers.get(channel).copied()
    }

    /// Completed get calls on a channel.
    pub fn get_count(&self, channel: &str) -> u64 {
        self.state.lock().get_counts.get(channel).copied().unwrap_or(0)
    }

    /// Script the `nth` get (zero-based) on a channel to fail with a
    /// communication error.
    pub fn fail_nth_get(&self, channel: &str, nth: u64) {
        self.state
            .lock()
            .fail_gets
            .entry(channel.to_string())
            .or_default()
            .insert(nth);
    }

    /// Make every get on a channel fail until [`MockInstrument::revive`].
    pub fn unplug(&self, channel: &str) {
        self.state.lock().dead.insert(channel.to_string());
    }

    /// Undo [`MockInstrument::unplug`].
    pub fn revive(&self, channel: &str) {
        self.state.lock().dead.remove(channel);
    }

    /// Build a connected parameter for one channel.
    ///
    /// Sets land in the channel register, gets read it back with the
    /// configured latency, jitter, and scripted failures applied.
    pub fn parameter(&self, channel: &str, validator: Validator<f64>) -> Parameter<f64> {
        let mut parameter = Parameter::new(channel).with_validator(validator);

        let state = self.state.clone();
        let latency = self.latency;
        let name = channel.to_string();
        parameter.connect_writer(move |value: f64| {
            let state = state.clone();
            let name = name.clone();
            Box::pin(async move {
                if latency > Duration::ZERO {
                    tokio::time::sleep(latency).await;
                }
                state.lock().registers.insert(name, value);
                Ok(())
            })
        });

        let state = self.state.clone();
        let latency = self.latency;
        let jitter = self.jitter;
        let name = channel.to_string();
        parameter.connect_reader(move || {
            let state = state.clone();
            let name = name.clone();
            Box::pin(async move {
                if latency > Duration::ZERO {
                    tokio::time::sleep(latency).await;
                }
                let mut state = state.lock();
                let count = state.get_counts.entry(name.clone()).or_insert(0);
                let index = *count;
                *count += 1;

                if state.dead.contains(&name)
                    || state
                        .fail_gets
                        .get(&name)
                        .is_some_and(|s| s.contains(&index))
                {
                    return Err(SweepError::comm(format!(
                        "mock channel '{name}' not responding"
                    )));
                }

                let base = state.registers.get(&name).copied().unwrap_or(0.0);
                drop(state);
                let noisy = if jitter > 0.0 {
                    base + rand::thread_rng().gen_range(-jitter..=jitter)
                } else {
                    base
                };
                Ok(noisy)
            })
        });

        parameter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let instrument = MockInstrument::new();
        let channel = instrument.parameter("dac0", Validator::range(-10.0, 10.0));

        channel.set(2.5).await.unwrap();
        assert_eq!(instrument.register("dac0"), Some(2.5));
        assert_eq!(channel.get().await.unwrap(), 2.5);
        assert_eq!(instrument.get_count("dac0"), 1);
    }

    #[tokio::test]
    async fn test_validator_blocks_register_write() {
        let instrument = MockInstrument::new();
        let channel = instrument.parameter("dac0", Validator::range(0.0, 1.0));

        assert!(channel.set(5.0).await.is_err());
        assert_eq!(instrument.register("dac0"), None);
    }

    #[tokio::test]
    async fn test_scripted_nth_failure() {
        let instrument = MockInstrument::new();
        instrument.set_register("adc0", 1.0);
        instrument.fail_nth_get("adc0", 1);
        let channel = instrument.parameter("adc0", Validator::None);

        assert!(channel.get().await.is_ok());
        assert!(channel.get().await.is_err());
        assert!(channel.get().await.is_ok());
    }

    #[tokio::test]
    async fn test_unplug_and_revive() {
        let instrument = MockInstrument::new();
        instrument.set_register("adc0", 3.0);
        let channel = instrument.parameter("adc0", Validator::None);

        instrument.unplug("adc0");
        assert!(channel.get().await.is_err());
        instrument.revive("adc0");
        assert_eq!(channel.get().await.unwrap(), 3.0);
    }

    #[tokio::test]
    async fn test_jitter_stays_bounded() {
        let instrument = MockInstrument::new().with_jitter(0.1);
        instrument.set_register("adc0", 10.0);
        let channel = instrument.parameter("adc0", Validator::None);

        for _ in 0..32 {
            let value = channel.get().await.unwrap();
            assert!((value - 10.0).abs() <= 0.1 + 1e-12);
        }
    }
}
