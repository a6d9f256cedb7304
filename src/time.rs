// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Time Axis

//! Time-axis helpers shared by the reducer, the cache and the staleness check.
//!
//! stella writes its diagnostics at every time step; the reduced cache keeps
//! one point every `dt` time units. Times are rounded to
//! [`TIME_DECIMALS`] digits before they are stored or compared, and all
//! comparisons go through [`TIME_EPSILON`] instead of exact float equality.

use std::fmt;

use ndarray::ArrayView1;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PostError, Result};

/// Decimal digits kept on every stored time value.
pub const TIME_DECIMALS: u32 = 8;

/// Two times closer than this are the same time.
pub const TIME_EPSILON: f64 = 1e-8;

/// Default stride between cached time points.
pub const DEFAULT_STRIDE: f64 = 10.0;

// ─── Stride ─────────────────────────────────────────────────────────────────

/// Positive, finite spacing between subsampled time points.
///
/// Integral strides render without a fractional part so that `dt = 10.0`
/// and `dt = 10` name the same cache file (`*.dt10.distribution3D`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Stride(f64);

impl Stride {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(PostError::InvalidStride(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_integral(self) -> bool {
        self.0.fract() == 0.0 && self.0 < i64::MAX as f64
    }
}

impl Default for Stride {
    fn default() -> Self {
        Self(DEFAULT_STRIDE)
    }
}

impl fmt::Display for Stride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integral() {
            write!(f, "{}", self.0 as i64)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl TryFrom<f64> for Stride {
    type Error = PostError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Stride> for f64 {
    fn from(stride: Stride) -> f64 {
        stride.0
    }
}

// ─── Rounding & Comparison ──────────────────────────────────────────────────

/// Round a time value to [`TIME_DECIMALS`] digits (half to even).
///
/// Values outside the decimal range (NaN, infinities, |t| > 7.9e28) are
/// returned unchanged.
pub fn round_time(t: f64) -> f64 {
    Decimal::from_f64(t)
        .map(|d| d.round_dp(TIME_DECIMALS))
        .and_then(|d| d.to_f64())
        .unwrap_or(t)
}

/// `a` lies strictly after `b`.
pub fn is_after(a: f64, b: f64) -> bool {
    a - b > TIME_EPSILON
}

pub fn is_strictly_increasing(time: ArrayView1<f64>) -> bool {
    time.iter()
        .zip(time.iter().skip(1))
        .all(|(&prev, &next)| is_after(next, prev))
}

// ─── Subsampling ────────────────────────────────────────────────────────────

/// Indices of the time points kept at a fixed step.
///
/// The first point is always kept; after that a point is kept once it lies
/// at least `stride` after the previously kept one. The selection only looks
/// backwards, so extending the time vector never changes indices that were
/// already chosen.
pub fn indices_at_fixed_step(time: ArrayView1<f64>, stride: Stride) -> Vec<usize> {
    let step = stride.value();
    let mut indices = Vec::new();
    let mut last_kept: Option<f64> = None;

    for (i, &t) in time.iter().enumerate() {
        let keep = match last_kept {
            None => true,
            Some(prev) => t - prev >= step - TIME_EPSILON,
        };
        if keep {
            indices.push(i);
            last_kept = Some(t);
        }
    }
    indices
}
