//! Tolerance and windowing primitives shared by the scoring engines.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

/// Slack added to every tolerance comparison so values that are equal on paper
/// (e.g. 65 bpm against a 60 bpm reference with a 5 bpm band) are not split by
/// floating-point representation error.
pub const COMPARISON_EPSILON: f64 = 1e-9;

/// `true` when `|a - b|` lies inside the closed band `[-tolerance, tolerance]`.
#[inline]
pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance + COMPARISON_EPSILON
}

/// Require a finite value strictly greater than zero.
pub fn require_positive(name: &'static str, value: f64) -> BenchResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(BenchError::InvalidTolerance { name, value })
    }
}

/// Require a finite value greater than or equal to zero.
pub fn require_non_negative(name: &'static str, value: f64) -> BenchResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(BenchError::InvalidTolerance { name, value })
    }
}

/// Upper bound on the number of points of any resampling grid or epoch list.
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// Number of whole `step`s that fit in `span`, rejecting steps so small that the
/// grid would exceed [`MAX_GRID_POINTS`].
pub fn grid_len(name: &'static str, span: f64, step: f64) -> BenchResult<usize> {
    let step = require_positive(name, step)?;
    let count = (span.max(0.0) / step + COMPARISON_EPSILON).floor();
    if !(count < MAX_GRID_POINTS as f64) {
        return Err(BenchError::InvalidTolerance { name, value: step });
    }
    Ok(count as usize)
}

/// Half-open scoring window `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl Epoch {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Consecutive whole windows of `window_s` seconds starting at `start`.
///
/// A trailing partial window is not emitted.
pub fn epochs(start: f64, end: f64, window_s: f64) -> BenchResult<Vec<Epoch>> {
    let window_s = require_positive("epoch length", window_s)?;
    if !(start.is_finite() && end.is_finite()) || end <= start {
        return Ok(Vec::new());
    }
    let count = grid_len("epoch length", end - start, window_s)?;
    Ok((0..count)
        .map(|index| Epoch {
            index,
            start: start + index as f64 * window_s,
            end: start + (index + 1) as f64 * window_s,
        })
        .collect())
}
