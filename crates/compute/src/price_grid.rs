//! Scattered listings to a smoothed per-pixel price field.
//!
//! Stages: expand the tile area by the kernel radius, load listings, bin them
//! into pixels, average each pixel, then spread every pixel's mean through the
//! Gaussian kernel and take the weighted average.

use foundation::{
    CoordinateArea, Point, Tile, degrees_to_inner_tile_coordinates, degrees_to_pixels,
    local_pixels_to_world_pixels, pixels_to_degrees, tile_to_area, world_pixels_to_local_pixels,
};
use streaming::{LoadError, PropertyInformation, PropertyLoader};

use crate::gaussian::GaussianWeight;
use crate::grid::{PixelGrid, WeightedValue};

/// Grows `area` by `radius` pixels on every side, measured at `zoom`.
pub fn expand_area(tile_size: u32, zoom: u8, area: &CoordinateArea, radius: u32) -> CoordinateArea {
    let r = f64::from(radius);
    let north_west = world_pixels_to_local_pixels(zoom, degrees_to_pixels(tile_size, area.north_west));
    let south_east = world_pixels_to_local_pixels(zoom, degrees_to_pixels(tile_size, area.south_east));

    let expanded = |p: Point| pixels_to_degrees(tile_size, local_pixels_to_world_pixels(zoom, p));
    CoordinateArea::new(
        expanded(Point::new(north_west.x - r, north_west.y - r)),
        expanded(Point::new(south_east.x + r, south_east.y + r)),
    )
}

/// Area whose listings can affect `tile`.
pub fn tile_area_with_margin(tile_size: u32, tile: Tile, radius: u32) -> CoordinateArea {
    expand_area(tile_size, tile.zoom, &tile_to_area(tile_size, tile), radius)
}

/// Bins every listing's price into the pixel that contains it.
pub fn place_properties_on_grid(
    tile_size: u32,
    tile: Tile,
    properties: &[PropertyInformation],
) -> PixelGrid<Vec<f64>> {
    let mut grid = PixelGrid::new();
    for property in properties {
        let p = degrees_to_inner_tile_coordinates(tile_size, tile, property.coordinates());
        grid.get_or_insert_with(p.x.floor() as i64, p.y.floor() as i64, Vec::new)
            .push(property.price);
    }
    grid
}

/// Mean price per pixel.
pub fn aggregate_price_grid(grid: PixelGrid<Vec<f64>>) -> PixelGrid<f64> {
    grid.map(|prices| prices.iter().sum::<f64>() / prices.len() as f64)
}

/// Spreads every populated pixel through `kernel`.
///
/// Targets outside `[0, tile_size]` on either axis are dropped. Each target
/// ends with `value` = weighted mean of the contributing prices and `weight`
/// = sum of kernel weights that reached it.
pub fn apply_gaussian_weights(
    tile_size: u32,
    grid: &PixelGrid<f64>,
    kernel: &[GaussianWeight],
) -> PixelGrid<WeightedValue> {
    let limit = i64::from(tile_size);
    let mut weighted: PixelGrid<WeightedValue> = PixelGrid::new();

    for (x, y, &price) in grid.iter() {
        for w in kernel {
            let tx = x + w.delta_x;
            let ty = y + w.delta_y;
            if tx < 0 || tx > limit || ty < 0 || ty > limit {
                continue;
            }
            let cell = weighted.get_or_insert_with(tx, ty, WeightedValue::default);
            cell.value += price * w.weight;
            cell.weight += w.weight;
        }
    }

    for (_, _, cell) in weighted.iter_mut() {
        cell.value /= cell.weight;
    }
    weighted
}

/// Synchronous pipeline for listings already in hand.
pub fn compute_price_grid(
    tile_size: u32,
    tile: Tile,
    properties: &[PropertyInformation],
    kernel: &[GaussianWeight],
) -> PixelGrid<WeightedValue> {
    let aggregated = aggregate_price_grid(place_properties_on_grid(tile_size, tile, properties));
    apply_gaussian_weights(tile_size, &aggregated, kernel)
}

/// Loads the listings around `tile` and runs the pipeline, yielding to the
/// scheduler between stages.
pub async fn generate_price_grid(
    tile_size: u32,
    radius: u32,
    kernel: &[GaussianWeight],
    loader: &PropertyLoader,
    tile: Tile,
) -> Result<PixelGrid<WeightedValue>, LoadError> {
    let area = tile_area_with_margin(tile_size, tile, radius);
    let properties = loader.fetch_properties_in_area(area).await?;

    let placed = place_properties_on_grid(tile_size, tile, &properties);
    tokio::task::yield_now().await;
    let aggregated = aggregate_price_grid(placed);
    tokio::task::yield_now().await;
    Ok(apply_gaussian_weights(tile_size, &aggregated, kernel))
}

#[cfg(test)]
mod tests {
    use foundation::{Coordinates, Tile, coordinate_is_inside_area, tile_to_area};
    use streaming::{Channel, PropertyInformation, PropertyType};

    use super::{
        aggregate_price_grid, apply_gaussian_weights, compute_price_grid, expand_area,
        place_properties_on_grid,
    };
    use crate::gaussian::{GaussianWeight, calculate_gaussian_weights};
    use crate::grid::PixelGrid;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn property(price: f64, latitude: f64, longitude: f64) -> PropertyInformation {
        PropertyInformation {
            id: format!("{price}@{latitude},{longitude}"),
            price,
            latitude,
            longitude,
            bedrooms: None,
            bathrooms: None,
            car_spaces: None,
            property_type: PropertyType::House,
            channel: Channel::Rent,
        }
    }

    fn tile() -> Tile {
        Tile::new(13, 7395, 5026)
    }

    #[test]
    fn expanded_area_contains_the_tile_with_a_pixel_margin() {
        let area = tile_to_area(256, tile());
        let expanded = expand_area(256, 13, &area, 50);
        assert!(expanded.north() > area.north());
        assert!(expanded.south() < area.south());
        assert!(expanded.west() < area.west());
        assert!(expanded.east() > area.east());

        // 50 px at zoom 13 is 50 / (256 * 2^13) of the world's 360°.
        let degrees = 360.0 * 50.0 / (256.0 * 8192.0);
        assert_close(area.west() - expanded.west(), degrees, 1e-9);
        assert_close(expanded.east() - area.east(), degrees, 1e-9);
    }

    #[test]
    fn properties_bin_by_floored_pixel() {
        let properties = vec![
            property(1000.0, -37.808295, 144.996736),
            property(1400.0, -37.808295, 144.996736),
            property(300.0, -37.808295, 145.002),
        ];
        let placed = place_properties_on_grid(256, tile(), &properties);
        assert_eq!(placed.get(123, 149), Some(&vec![1000.0, 1400.0]));
        assert_eq!(placed.get(153, 149), Some(&vec![300.0]));

        let aggregated = aggregate_price_grid(placed);
        assert_eq!(aggregated.get(123, 149), Some(&1200.0));
    }

    #[test]
    fn listings_outside_the_tile_get_negative_cells() {
        let area = tile_to_area(256, tile());
        let west = Coordinates::new(area.center().latitude, area.west() - 0.001);
        assert!(!coordinate_is_inside_area(west, &area));
        let placed = place_properties_on_grid(256, tile(), &[property(1.0, west.latitude, west.longitude)]);
        let (x, _, _) = placed.iter().next().unwrap();
        assert!(x < 0);
    }

    #[test]
    fn single_cell_spreads_with_its_own_value() {
        let mut grid = PixelGrid::new();
        grid.insert(10, 10, 500.0);
        let kernel = calculate_gaussian_weights(5);
        let weighted = apply_gaussian_weights(256, &grid, &kernel);

        assert_eq!(weighted.len(), kernel.len());
        for (_, _, cell) in weighted.iter() {
            assert_close(cell.value, 500.0, 1e-9);
        }
        assert_eq!(weighted.get(10, 10).unwrap().weight, 1.0);
    }

    #[test]
    fn targets_past_the_edges_are_discarded() {
        let mut grid = PixelGrid::new();
        grid.insert(0, 256, 100.0);
        let kernel = vec![
            GaussianWeight { delta_x: -1, delta_y: 0, weight: 1.0 },
            GaussianWeight { delta_x: 0, delta_y: 0, weight: 1.0 },
            GaussianWeight { delta_x: 0, delta_y: 1, weight: 1.0 },
        ];
        let weighted = apply_gaussian_weights(256, &grid, &kernel);
        let cells: Vec<(i64, i64)> = weighted.iter().map(|(x, y, _)| (x, y)).collect();
        assert_eq!(cells, vec![(0, 256)]);
    }

    #[test]
    fn overlapping_kernels_blend_by_weight() {
        let properties = vec![
            property(1200.0, -37.808295, 144.996736),
            property(300.0, -37.808295, 145.002),
        ];
        let kernel = calculate_gaussian_weights(50);
        let grid = compute_price_grid(256, tile(), &properties, &kernel);

        let w = (-1.62f64).exp();
        let at_cluster = grid.get(123, 149).unwrap();
        assert_close(at_cluster.weight, 1.0 + w, 1e-9);
        assert_close(at_cluster.value, (1200.0 + 300.0 * w) / (1.0 + w), 1e-6);

        let at_second = grid.get(153, 149).unwrap();
        assert_close(at_second.value, (1200.0 * w + 300.0) / (1.0 + w), 1e-6);
    }
}
