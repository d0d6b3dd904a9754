//! Formatters - on-disk layouts for datasets.
//!
//! A formatter owns the byte-level layout of a dataset location: one file
//! per array plus a metadata record. The contract that matters is partial
//! reads: deserializing a location while the run is still going reconstructs
//! exactly the cells flushed so far, with unflushed cells reported as
//! sentinel, never as zero or garbage.
//!
//! Formatters are driven incrementally: [`Formatter::append_region`] only
//! receives cells past the flush cursor, so already-flushed regions are
//! never re-serialized.

use std::path::Path;

use async_trait::async_trait;

use crate::dataset::array::DataArray;
use crate::dataset::metadata::{ArrayDescriptor, RunMetadata};
use crate::error::SweepResult;

mod csv;

pub use self::csv::CsvFormatter;

/// Serializes and deserializes a dataset to a specific on-disk layout.
#[async_trait]
pub trait Formatter: Send + Sync {
    /// Write (or rewrite) the metadata record of the location.
    async fn write_metadata(&self, location: &Path, metadata: &RunMetadata) -> SweepResult<()>;

    /// Append a contiguous region of one array, starting at linear index
    /// `start`. Called with monotonically increasing, non-overlapping
    /// regions per array.
    async fn append_region(
        &self,
        location: &Path,
        array: &str,
        start: usize,
        values: &[f64],
    ) -> SweepResult<()>;

    /// Read the metadata record back from a location.
    async fn read_metadata(&self, location: &Path) -> SweepResult<RunMetadata>;

    /// Reconstruct one array from a location. Cells never flushed come back
    /// as sentinel.
    async fn read_array(
        &self,
        location: &Path,
        descriptor: &ArrayDescriptor,
    ) -> SweepResult<DataArray>;
}
