//! Fixed-shape measurement arrays with sentinel fill.
//!
//! Arrays are preallocated at their final shape when the loop compiles, so
//! live sweeps never reallocate and concurrent readers never observe a
//! resize. A cell is either unwritten (sentinel), written with a sample, or
//! written with the sentinel to mark a failed measurement. The written
//! bitmap keeps those last two apart: a failed cell still advances the
//! flush cursor, an unwritten one does not.

use crate::error::{SweepError, SweepResult};

/// Reserved marker for unwritten or failed cells.
pub const SENTINEL: f64 = f64::NAN;

/// True when `value` is the sentinel.
pub fn is_sentinel(value: f64) -> bool {
    value.is_nan()
}

/// One named, fixed-shape, row-major array of the dataset.
#[derive(Clone, Debug)]
pub struct DataArray {
    name: String,
    unit: String,
    /// Outer-most dimension first.
    shape: Vec<usize>,
    values: Vec<f64>,
    written: Vec<bool>,
}

impl DataArray {
    /// Allocate a sentinel-filled array of the given shape.
    pub fn new(name: impl Into<String>, unit: impl Into<String>, shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            name: name.into(),
            unit: unit.into(),
            shape,
            values: vec![SENTINEL; len],
            written: vec![false; len],
        }
    }

    /// Array name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical unit tag.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Array shape, outer-most dimension first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the array has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Row-major linear index for a coordinate.
    pub fn linear_index(&self, coordinate: &[usize]) -> SweepResult<usize> {
        if coordinate.len() != self.shape.len()
            || coordinate.iter().zip(&self.shape).any(|(c, s)| c >= s)
        {
            return Err(SweepError::ShapeMismatch {
                array: self.name.clone(),
                coordinate: coordinate.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let mut index = 0;
        for (c, s) in coordinate.iter().zip(&self.shape) {
            index = index * s + c;
        }
        Ok(index)
    }

    /// Write a cell exactly once.
    ///
    /// Fails with [`SweepError::Overwrite`] when the cell already holds a
    /// non-sentinel value and `overwrite` is false. Writing the sentinel
    /// marks a failed measurement: the cell counts as written (the flush
    /// cursor may pass it) but may later be replaced by a partial rerun.
    pub fn write(&mut self, coordinate: &[usize], value: f64, overwrite: bool) -> SweepResult<()> {
        let index = self.linear_index(coordinate)?;
        if !overwrite && !is_sentinel(self.values[index]) {
            return Err(SweepError::Overwrite {
                array: self.name.clone(),
                index,
            });
        }
        self.values[index] = value;
        self.written[index] = true;
        Ok(())
    }

    /// Current cell contents; sentinel for unwritten cells.
    pub fn read(&self, coordinate: &[usize]) -> SweepResult<f64> {
        let index = self.linear_index(coordinate)?;
        Ok(self.values[index])
    }

    /// True when the cell was ever written (samples and failed cells alike).
    pub fn is_written(&self, coordinate: &[usize]) -> SweepResult<bool> {
        let index = self.linear_index(coordinate)?;
        Ok(self.written[index])
    }

    /// Flat copy of all cells, sentinels included.
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.clone()
    }

    /// Flat slice of the cells in `[start, end)` linear order.
    pub fn slice(&self, start: usize, end: usize) -> &[f64] {
        &self.values[start.min(self.values.len())..end.min(self.values.len())]
    }

    /// Length of the written prefix in linear order.
    ///
    /// This is the flush frontier: every cell before it was written (sample
    /// or failed), every cell at or after it may still receive data.
    pub fn written_prefix(&self) -> usize {
        self.written.iter().take_while(|&&w| w).count()
    }

    /// Restore a cell from persisted contents, bypassing the overwrite
    /// check. Used by formatters when deserializing a location.
    pub fn restore(&mut self, index: usize, value: f64) -> SweepResult<()> {
        if index >= self.values.len() {
            return Err(SweepError::ShapeMismatch {
                array: self.name.clone(),
                coordinate: vec![index],
                shape: self.shape.clone(),
            });
        }
        self.values[index] = value;
        self.written[index] = true;
        Ok(())
    }
}
