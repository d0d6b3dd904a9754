//! Parameter<T> - typed, named instrument endpoints.
//!
//! A parameter wraps one gettable/settable channel of an instrument behind a
//! uniform abstraction the sweep engine can drive without knowing anything
//! about transport. It synchronizes three things:
//!
//! - Hardware (via async read/write callbacks)
//! - A cached last value (via a watch channel, observable by consumers)
//! - A snapshot history used for metadata capture, never for control flow
//!
//! # Invariants
//!
//! - Every `set` validates the candidate value *before* the instrument write
//!   is invoked; the cache is updated only on success.
//! - Every successful `get` updates the cache before returning.
//!
//! # Example
//!
//! ```rust,ignore
//! use sweep_daq::parameter::Parameter;
//!
//! let mut gate = Parameter::new("gate_voltage")
//!     .with_unit("V")
//!     .with_validator(Validator::range(-2.0, 2.0));
//!
//! gate.connect_writer(|v| Box::pin(async move { dac.write(v).await }));
//! gate.connect_reader(|| Box::pin(async move { dac.read().await }));
//! let gate = Arc::new(gate);
//!
//! gate.set(0.5).await?;
//! let v = gate.get().await?;
//! ```

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{SweepError, SweepResult};
use crate::sweep::SweepRange;
use crate::validator::Validator;

/// Maximum number of get/set records retained per parameter.
const HISTORY_CAPACITY: usize = 1024;

/// Async hardware write callback.
pub type HardwareWriter<T> =
    Arc<dyn Fn(T) -> BoxFuture<'static, SweepResult<()>> + Send + Sync>;

/// Async hardware read callback.
pub type HardwareReader<T> =
    Arc<dyn Fn() -> BoxFuture<'static, SweepResult<T>> + Send + Sync>;

/// Which operation produced a history record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryOp {
    /// Value was read from the instrument.
    Get,
    /// Value was written to the instrument.
    Set,
}

/// One entry of the snapshot history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord<T> {
    /// When the operation completed.
    pub timestamp: DateTime<Utc>,
    /// Get or set.
    pub op: HistoryOp,
    /// The value that was read or written.
    pub value: T,
}

/// Serializable snapshot of a parameter for run metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSnapshot<T> {
    /// Parameter name.
    pub name: String,
    /// Physical unit tag.
    pub unit: String,
    /// Summary of the attached validator.
    pub validator: String,
    /// Cached last value, if any operation succeeded yet.
    pub value: Option<T>,
    /// Whether a hardware reader is connected.
    pub gettable: bool,
    /// Whether a hardware writer is connected.
    pub settable: bool,
    /// Number of history records accumulated.
    pub history_len: usize,
}

/// Typed, named endpoint wrapping an instrument read/write channel.
pub struct Parameter<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    name: String,
    unit: String,
    validator: Validator<T>,

    /// Cached last value, distributed to subscribers via a watch channel.
    cache_tx: watch::Sender<Option<T>>,

    /// Hardware write function. When absent, `set` only updates the cache.
    writer: Option<HardwareWriter<T>>,

    /// Hardware read function. When absent, `get` returns the cached value.
    reader: Option<HardwareReader<T>>,

    /// Bounded get/set history for metadata capture.
    history: Mutex<VecDeque<HistoryRecord<T>>>,
}

impl<T> Parameter<T>
where
    T: Clone + Send + Sync + PartialOrd + PartialEq + Debug + 'static,
{
    /// Create a new parameter with no hardware attached.
    pub fn new(name: impl Into<String>) -> Self {
        let (cache_tx, _) = watch::channel(None);
        Self {
            name: name.into(),
            unit: String::new(),
            validator: Validator::None,
            cache_tx,
            writer: None,
            reader: None,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Set the physical unit tag (metadata only, no conversion).
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Attach a validator guarding every `set`.
    pub fn with_validator(mut self, validator: Validator<T>) -> Self {
        self.validator = validator;
        self
    }

    /// Seed the cache with an initial value.
    pub fn with_initial(self, value: T) -> Self {
        self.cache_tx.send_replace(Some(value));
        self
    }

    /// Connect the hardware write function.
    ///
    /// After this, `set()` forwards validated values to the instrument before
    /// updating the cache.
    pub fn connect_writer(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, SweepResult<()>> + Send + Sync + 'static,
    ) {
        self.writer = Some(Arc::new(writer));
    }

    /// Connect the hardware read function.
    ///
    /// After this, `get()` performs an instrument round-trip instead of
    /// returning the cache.
    pub fn connect_reader(
        &mut self,
        reader: impl Fn() -> BoxFuture<'static, SweepResult<T>> + Send + Sync + 'static,
    ) {
        self.reader = Some(Arc::new(reader));
    }

    /// Parameter name, unique within a station.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical unit tag.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// The attached validator.
    pub fn validator(&self) -> &Validator<T> {
        &self.validator
    }

    /// True when a hardware reader is connected.
    pub fn is_gettable(&self) -> bool {
        self.reader.is_some()
    }

    /// True when a hardware writer is connected.
    pub fn is_settable(&self) -> bool {
        self.writer.is_some()
    }

    /// Cached last value without touching the instrument.
    pub fn cached(&self) -> Option<T> {
        self.cache_tx.borrow().clone()
    }

    /// Subscribe to cache updates.
    ///
    /// The receiver observes every successful get/set. Useful for live
    /// widgets that track a parameter outside the dataset.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.cache_tx.subscribe()
    }

    /// Read the current value from the instrument.
    ///
    /// Updates the cache and the snapshot history before returning. Fails
    /// with [`SweepError::Communication`] when the instrument is unreachable;
    /// the cache keeps its previous value in that case. Without a connected
    /// reader the cached value is returned, or a communication error when the
    /// cache is empty too.
    pub async fn get(&self) -> SweepResult<T> {
        let value = match &self.reader {
            Some(reader) => reader().await.map_err(|e| self.as_comm_error(e))?,
            None => self.cached().ok_or_else(|| {
                SweepError::comm(format!("parameter '{}' has no reader and no cache", self.name))
            })?,
        };

        self.cache_tx.send_replace(Some(value.clone()));
        self.record(HistoryOp::Get, value.clone());
        Ok(value)
    }

    /// Validate, then write a value to the instrument.
    ///
    /// Order is load-bearing: validation happens before any instrument
    /// traffic, and the cache is updated only after the write succeeded.
    pub async fn set(&self, value: T) -> SweepResult<()> {
        self.validator.validate(&self.name, &value)?;

        if let Some(writer) = &self.writer {
            writer(value.clone())
                .await
                .map_err(|e| self.as_comm_error(e))?;
        }

        self.cache_tx.send_replace(Some(value.clone()));
        self.record(HistoryOp::Set, value);
        Ok(())
    }

    /// Serializable summary for run metadata.
    pub fn snapshot(&self) -> ParameterSnapshot<T> {
        ParameterSnapshot {
            name: self.name.clone(),
            unit: self.unit.clone(),
            validator: self.validator.summary(),
            value: self.cached(),
            gettable: self.is_gettable(),
            settable: self.is_settable(),
            history_len: self.history.lock().len(),
        }
    }

    /// Number of history records accumulated so far.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Most recent history records, newest last.
    pub fn history(&self) -> Vec<HistoryRecord<T>> {
        self.history.lock().iter().cloned().collect()
    }

    fn record(&self, op: HistoryOp, value: T) {
        let mut history = self.history.lock();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(HistoryRecord {
            timestamp: Utc::now(),
            op,
            value,
        });
    }

    fn as_comm_error(&self, err: SweepError) -> SweepError {
        match err {
            e @ SweepError::Communication { .. } => e,
            other => SweepError::comm(format!("parameter '{}': {}", self.name, other)),
        }
    }
}

impl Parameter<f64> {
    /// Produce a finite, restartable sequence of set-points with `num`
    /// evenly spaced values from `start` to `stop` inclusive.
    ///
    /// The range is a plain value: it can be cloned, iterated repeatedly, and
    /// reused across runs of the same loop spec.
    pub fn sweep(&self, start: f64, stop: f64, num: usize) -> SweepRange {
        SweepRange::by_num(start, stop, num)
    }

    /// Produce set-points from `start` towards `stop` in increments of
    /// `step`. The last point never overshoots `stop`.
    pub fn sweep_step(&self, start: f64, stop: f64, step: f64) -> SweepRange {
        SweepRange::by_step(start, stop, step)
    }
}

impl<T> Debug for Parameter<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("cached", &self.cache_tx.borrow())
            .finish()
    }
}
