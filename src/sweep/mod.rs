//! Sweep specification and execution.
//!
//! A sweep goes through three phases: a declarative [`Loop`] (pure value,
//! reusable), a compiled [`ActiveLoop`] (storage allocated, bound to one
//! run), and a terminal [`RunReport`]. The split keeps the expensive and
//! irreversible parts (directory creation, hardware traffic) out of the
//! builder.

pub mod action;
pub mod active;
pub mod loop_spec;
pub mod range;

pub use action::Action;
pub use active::{AbortHandle, ActiveLoop, LoopState, RunReport};
pub use loop_spec::{Loop, SweepAxis};
pub use range::SweepRange;
