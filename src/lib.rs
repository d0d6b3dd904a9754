//! Parameter-sweep acquisition engine with a concurrent dataset store.
//!
//! This crate drives laboratory measurements: instrument channels are
//! wrapped as validated [`Parameter`]s, a declarative [`Loop`] sweeps one or
//! more of them over a Cartesian grid, and every sample lands in a
//! [`DataSet`] that is safe to read, subscribe to, and incrementally persist
//! while acquisition continues.
//!
//! # Architecture
//!
//! - **[`parameter`]**: typed gettable/settable endpoints with validators,
//!   a watch-channel cache, and snapshot history. Hardware access goes
//!   through async callbacks, so drivers stay out of this crate.
//! - **[`sweep`]**: the `Loop -> ActiveLoop` pipeline. A loop is a pure
//!   value; compiling it allocates storage, running it interprets the
//!   per-point action schedule with retry, fail-forward, and cooperative
//!   abort semantics.
//! - **[`dataset`]**: fixed-shape sentinel-filled arrays with write-once
//!   cells, incremental flushing through a [`Formatter`], and bounded
//!   non-blocking subscriber notifications.
//! - **[`monitor`]**: background polling of independent parameters into
//!   append arrays of the same dataset.
//! - **[`station`]**: the explicit per-rig parameter registry.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sweep_daq::{
//!     Action, CsvFormatter, Loop, MockInstrument, SweepConfig, SweepRange, Validator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> sweep_daq::SweepResult<()> {
//! let rig = MockInstrument::new();
//! let gate = Arc::new(rig.parameter("gate", Validator::range(-1.0, 1.0)));
//! let current = Arc::new(rig.parameter("current", Validator::None));
//!
//! let config = SweepConfig::default();
//! let active = Loop::sweep(gate, SweepRange::by_num(-1.0, 1.0, 21))
//!     .each(Action::Read(current))
//!     .compile("iv_curve", &config, Arc::new(CsvFormatter::new()))
//!     .await?;
//!
//! let report = active.run().await?;
//! println!("finished: {:?} at {}", report.status, report.location.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod formatter;
pub mod mock;
pub mod monitor;
pub mod parameter;
pub mod station;
pub mod sweep;
pub mod validator;

pub use config::{CommErrorPolicy, RetryPolicy, SweepConfig};
pub use dataset::{
    is_sentinel, ArrayDescriptor, ArrayKind, DataSet, FlushNotice, FlushedRegion,
    OverflowPolicy, RunMetadata, RunStatus, SENTINEL,
};
pub use error::{SweepError, SweepResult};
pub use formatter::{CsvFormatter, Formatter};
pub use mock::MockInstrument;
pub use monitor::{Monitor, MonitorHandle};
pub use parameter::{Parameter, ParameterSnapshot};
pub use station::Station;
pub use sweep::{AbortHandle, Action, ActiveLoop, Loop, LoopState, RunReport, SweepRange};
pub use validator::Validator;
