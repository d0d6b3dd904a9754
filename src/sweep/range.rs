//! Sweep ranges - finite, restartable set-point sequences.
//!
//! A [`SweepRange`] is a value, not an iterator: the same range can be
//! materialized any number of times, so one loop spec can be reused across
//! runs. Points are generated lazily and are always finite.

use serde::{Deserialize, Serialize};

/// Finite sequence of evenly spaced set-points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    start: f64,
    stop: f64,
    num: usize,
}

impl SweepRange {
    /// `num` evenly spaced points from `start` to `stop` inclusive.
    ///
    /// `num == 0` yields an empty range; `num == 1` yields just `start`.
    pub fn by_num(start: f64, stop: f64, num: usize) -> Self {
        Self { start, stop, num }
    }

    /// Points from `start` towards `stop` in increments of `step`.
    ///
    /// The sequence never overshoots `stop`. A `step` of zero or with the
    /// wrong sign yields the single point `start`.
    pub fn by_step(start: f64, stop: f64, step: f64) -> Self {
        let span = stop - start;
        let num = if step == 0.0 || span == 0.0 || span.signum() != step.signum() {
            1
        } else {
            (span / step).floor() as usize + 1
        };
        let actual_stop = start + step * (num.saturating_sub(1)) as f64;
        Self {
            start,
            stop: actual_stop,
            num,
        }
    }

    /// Number of set-points in the range.
    pub fn len(&self) -> usize {
        self.num
    }

    /// True when the range contains no set-points.
    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    /// Set-point at `index`, or `None` past the end.
    pub fn point(&self, index: usize) -> Option<f64> {
        if index >= self.num {
            return None;
        }
        if self.num <= 1 {
            return Some(self.start);
        }
        let step = (self.stop - self.start) / (self.num - 1) as f64;
        Some(self.start + step * index as f64)
    }

    /// Lazy iterator over the set-points. Restartable: call again for a
    /// fresh pass.
    pub fn points(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.num).map(move |i| {
            // Indices are in range by construction.
            self.point(i).unwrap_or(self.start)
        })
    }

    /// Materialize the whole range eagerly.
    pub fn to_vec(&self) -> Vec<f64> {
        self.points().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_num_endpoints() {
        let r = SweepRange::by_num(0.0, 10.0, 11);
        let pts = r.to_vec();
        assert_eq!(pts.len(), 11);
        assert!((pts[0] - 0.0).abs() < 1e-12);
        assert!((pts[5] - 5.0).abs() < 1e-12);
        assert!((pts[10] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_by_num_degenerate() {
        assert_eq!(SweepRange::by_num(3.0, 9.0, 1).to_vec(), vec![3.0]);
        assert!(SweepRange::by_num(3.0, 9.0, 0).to_vec().is_empty());
    }

    #[test]
    fn test_by_step_exact_division() {
        let r = SweepRange::by_step(0.0, 1.0, 0.25);
        assert_eq!(r.len(), 5);
        assert!((r.to_vec()[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_by_step_never_overshoots() {
        let r = SweepRange::by_step(0.0, 1.0, 0.3);
        let pts = r.to_vec();
        assert_eq!(pts.len(), 4);
        assert!(pts.iter().all(|&p| p <= 1.0 + 1e-12));
    }

    #[test]
    fn test_by_step_descending() {
        let r = SweepRange::by_step(1.0, 0.0, -0.5);
        assert_eq!(r.to_vec(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_by_step_wrong_sign_yields_start() {
        let r = SweepRange::by_step(0.0, 1.0, -0.5);
        assert_eq!(r.to_vec(), vec![0.0]);
    }

    #[test]
    fn test_restartable() {
        let r = SweepRange::by_num(0.0, 2.0, 3);
        let first: Vec<f64> = r.points().collect();
        let second: Vec<f64> = r.points().collect();
        assert_eq!(first, second);
    }
}
