//! Concurrent measurement storage.
//!
//! A [`DataSet`] owns a fixed set of sentinel-filled [`DataArray`]s shaped
//! when the loop compiles, streams newly written regions through a formatter
//! on flush, and fans notifications out to bounded subscribers.

pub mod array;
mod dataset;
pub mod metadata;
pub mod subscriber;

pub use array::{is_sentinel, DataArray, SENTINEL};
pub use dataset::DataSet;
pub use metadata::{new_run_uid, ArrayDescriptor, ArrayKind, RunMetadata, RunStatus};
pub use subscriber::{FlushNotice, FlushedRegion, OverflowPolicy, SubscriberRegistry};
