use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaussianWeight {
    pub delta_x: i64,
    pub delta_y: i64,
    pub weight: f64,
}

/// Immutable kernel shared between tiles and threads.
pub type GaussianKernel = Arc<[GaussianWeight]>;

/// Truncated circular Gaussian with standard deviation `radius / 3`.
///
/// Only offsets strictly inside the radius are kept. The center weight is 1.
pub fn calculate_gaussian_weights(radius: u32) -> Vec<GaussianWeight> {
    let r = i64::from(radius);
    let radius_squared = (r * r) as f64;
    let deviation = f64::from(radius) / 3.0;
    let two_deviation_squared = 2.0 * deviation * deviation;

    let mut weights = Vec::new();
    for delta_x in -r..r {
        for delta_y in -r..r {
            let distance = (delta_x * delta_x + delta_y * delta_y) as f64;
            if distance < radius_squared {
                weights.push(GaussianWeight {
                    delta_x,
                    delta_y,
                    weight: (-distance / two_deviation_squared).exp(),
                });
            }
        }
    }
    weights
}

static KERNELS: Lazy<Mutex<HashMap<u32, GaussianKernel>>> = Lazy::new(Default::default);

/// Memoized [`calculate_gaussian_weights`].
pub fn gaussian_kernel(radius: u32) -> GaussianKernel {
    KERNELS
        .lock()
        .entry(radius)
        .or_insert_with(|| calculate_gaussian_weights(radius).into())
        .clone()
}
