use serde::{Deserialize, Serialize};

/// Price bounds used to normalize the color ramp.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Position of `value` in the range, clamped to `[0, 1]`.
    ///
    /// A degenerate range maps values at or above `max` to 1 and the rest to 0.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max <= self.min {
            return if value >= self.max { 1.0 } else { 0.0 };
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

const FENCE: f64 = 1.5;

/// Lower and upper quartiles of an ascending sample, or `None` when empty.
fn quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    let last = sorted.len().checked_sub(1)?;
    let n = sorted.len() as f64;
    let q1 = sorted[((n * 0.25).ceil() as usize).min(last)];
    let q3 = sorted[((n * 0.75).floor() as usize).min(last)];
    Some((q1, q3))
}

fn sorted(prices: &[f64]) -> Vec<f64> {
    let mut prices = prices.to_vec();
    prices.sort_by(f64::total_cmp);
    prices
}

/// Smallest sample price that is not a low outlier.
///
/// `prices` is expected to be the cheapest listings; anything below
/// `Q1 - 1.5 * IQR` is skipped.
pub fn robust_minimum(prices: &[f64]) -> Option<f64> {
    let prices = sorted(prices);
    let (q1, q3) = quartiles(&prices)?;
    let fence = q1 - (q3 - q1) * FENCE;
    prices.into_iter().find(|price| *price >= fence)
}

/// Largest sample price that is not a high outlier.
pub fn robust_maximum(prices: &[f64]) -> Option<f64> {
    let prices = sorted(prices);
    let (q1, q3) = quartiles(&prices)?;
    let fence = q3 + (q3 - q1) * FENCE;
    prices.into_iter().rev().find(|price| *price <= fence)
}

/// Combines an ascending and a descending sample into a range.
pub fn robust_range(cheapest: &[f64], dearest: &[f64]) -> Option<PriceRange> {
    Some(PriceRange::new(
        robust_minimum(cheapest)?,
        robust_maximum(dearest)?,
    ))
}
