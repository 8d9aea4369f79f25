use streaming::PriceRange;

use crate::grid::{PixelGrid, WeightedValue};

/// Ramp stops from cheapest to dearest: blue, aqua, green, yellow, red.
pub const COLOR_STOPS: [[u8; 3]; 5] = [
    [0, 0, 255],
    [0, 255, 255],
    [0, 255, 0],
    [255, 255, 0],
    [255, 0, 0],
];

/// Opacity cap so the map stays readable underneath.
pub const MAX_ALPHA: f64 = 255.0 * 0.6;

const COLOR_EASING_DEGREE: i32 = 6;
const ALPHA_EASING_DEGREE: i32 = 8;

/// `1 - (1 - t)^degree`.
pub fn ease_out(t: f64, degree: i32) -> f64 {
    1.0 - (1.0 - t).powi(degree)
}

/// Piecewise-linear interpolation across consecutive `(from, to)` segments.
///
/// `t` in `[0, 1]` is split evenly over the segments; `t == 1` yields the end
/// of the last one.
pub fn interpolate_multiple(t: f64, segments: &[(f64, f64)]) -> f64 {
    let Some(&(_, last)) = segments.last() else {
        return 0.0;
    };
    if t >= 1.0 {
        return last;
    }
    let span = t.max(0.0) * segments.len() as f64;
    let index = span.floor() as usize;
    let (from, to) = segments[index];
    from + (to - from) * (span - index as f64)
}

/// RGB for `price` on the eased ramp.
pub fn color_gradient(range: &PriceRange, price: f64) -> [u8; 3] {
    let t = ease_out(range.normalize(price), COLOR_EASING_DEGREE);
    let mut color = [0u8; 3];
    for (channel, out) in color.iter_mut().enumerate() {
        let segments: Vec<(f64, f64)> = COLOR_STOPS
            .windows(2)
            .map(|pair| (f64::from(pair[0][channel]), f64::from(pair[1][channel])))
            .collect();
        *out = interpolate_multiple(t, &segments).round() as u8;
    }
    color
}

/// Alpha for an accumulated kernel weight, saturating at `max_weight`.
pub fn alpha_gradient(max_weight: f64, weight: f64) -> u8 {
    let t = if max_weight > 0.0 {
        (weight / max_weight).clamp(0.0, 1.0)
    } else {
        1.0
    };
    (MAX_ALPHA * ease_out(t, ALPHA_EASING_DEGREE)).round() as u8
}

/// Paints `grid` into a row-major RGBA buffer of `tile_size²` pixels.
///
/// Pixels without a positive value stay fully transparent.
pub fn rasterize(
    tile_size: u32,
    range: &PriceRange,
    max_weight: f64,
    grid: &PixelGrid<WeightedValue>,
) -> Vec<u8> {
    let size = tile_size as usize;
    let mut data = vec![0u8; 4 * size * size];

    for (x, y, cell) in grid.iter() {
        if x < 0 || y < 0 || x >= i64::from(tile_size) || y >= i64::from(tile_size) {
            continue;
        }
        if cell.value.is_nan() || cell.value <= 0.0 {
            continue;
        }
        let offset = (y as usize * size + x as usize) * 4;
        let [r, g, b] = color_gradient(range, cell.value);
        data[offset..offset + 4].copy_from_slice(&[r, g, b, alpha_gradient(max_weight, cell.weight)]);
    }
    data
}

/// A fully transparent tile.
pub fn transparent_tile(tile_size: u32) -> Vec<u8> {
    vec![0u8; 4 * tile_size as usize * tile_size as usize]
}

#[cfg(test)]
mod tests {
    use streaming::PriceRange;

    use super::{alpha_gradient, color_gradient, ease_out, interpolate_multiple, rasterize};
    use crate::grid::{PixelGrid, WeightedValue};

    const RANGE: PriceRange = PriceRange::new(100.0, 4000.0);

    fn cell(value: f64, weight: f64) -> WeightedValue {
        WeightedValue { value, weight }
    }

    #[test]
    fn easing_endpoints() {
        assert_eq!(ease_out(0.0, 6), 0.0);
        assert_eq!(ease_out(1.0, 6), 1.0);
        assert!(ease_out(0.25, 6) > 0.75);
    }

    #[test]
    fn interpolation_across_segments() {
        let segments = [(0.0, 10.0), (10.0, 20.0)];
        assert_eq!(interpolate_multiple(0.0, &segments), 0.0);
        assert_eq!(interpolate_multiple(0.25, &segments), 5.0);
        assert_eq!(interpolate_multiple(0.75, &segments), 15.0);
        assert_eq!(interpolate_multiple(1.0, &segments), 20.0);
    }

    #[test]
    fn ramp_ends_are_blue_and_red() {
        assert_eq!(color_gradient(&RANGE, 100.0), [0, 0, 255]);
        assert_eq!(color_gradient(&RANGE, 50.0), [0, 0, 255]);
        assert_eq!(color_gradient(&RANGE, 4000.0), [255, 0, 0]);
        assert_eq!(color_gradient(&RANGE, 90_000.0), [255, 0, 0]);
    }

    #[test]
    fn degenerate_range_does_not_produce_nan_colors() {
        let flat = PriceRange::new(500.0, 500.0);
        assert_eq!(color_gradient(&flat, 500.0), [255, 0, 0]);
        assert_eq!(color_gradient(&flat, 499.0), [0, 0, 255]);
    }

    #[test]
    fn alpha_is_capped() {
        assert_eq!(alpha_gradient(10.0, 0.0), 0);
        assert_eq!(alpha_gradient(10.0, 10.0), 153);
        assert_eq!(alpha_gradient(10.0, 1000.0), 153);
        assert!(alpha_gradient(10.0, 1.0) > 0);
    }

    #[test]
    fn only_positive_values_are_painted() {
        let mut grid = PixelGrid::new();
        grid.insert(3, 1, cell(4000.0, 10.0));
        grid.insert(4, 1, cell(0.0, 10.0));
        grid.insert(5, 1, cell(-20.0, 10.0));
        grid.insert(256, 0, cell(4000.0, 10.0));
        grid.insert(-1, 0, cell(4000.0, 10.0));

        let data = rasterize(256, &RANGE, 10.0, &grid);
        assert_eq!(data.len(), 4 * 256 * 256);

        let offset = (256 + 3) * 4;
        assert_eq!(&data[offset..offset + 4], &[255, 0, 0, 153]);

        let painted = data.chunks(4).filter(|px| px[3] != 0).count();
        assert_eq!(painted, 1);
    }
}
