//! Spherical Mercator conversions between degrees, world pixels, tile indices
//! and zoom-scaled local pixels.
//!
//! Coordinate spaces:
//! - world pixels: `[0, tile_size)` covers the whole world at zoom 0.
//! - local pixels: world pixels scaled by `2^zoom`.
//! - tiles: local pixels divided by `tile_size`.
//!
//! Every function here is pure and cheap; scale factors are powers of two so
//! the local/world conversions are exact inverses.

use std::f64::consts::PI;

use crate::coordinates::Coordinates;
use crate::tile::{Point, Tile, TilePoint, zoom_scale};

/// Bound on `sin(latitude)`, roughly ±89.19°.
pub const MAX_SIN_LATITUDE: f64 = 0.9999;

/// Projects degrees into world pixels.
///
/// Latitudes close to the poles are clamped instead of diverging.
pub fn degrees_to_pixels(tile_size: u32, coordinates: Coordinates) -> Point {
    let size = f64::from(tile_size);
    let sin_y = coordinates
        .latitude
        .to_radians()
        .sin()
        .clamp(-MAX_SIN_LATITUDE, MAX_SIN_LATITUDE);

    Point::new(
        size * (0.5 + coordinates.longitude / 360.0),
        size * (0.5 - ((1.0 + sin_y) / (1.0 - sin_y)).ln() / (4.0 * PI)),
    )
}

/// Inverse of [`degrees_to_pixels`].
pub fn pixels_to_degrees(tile_size: u32, point: Point) -> Coordinates {
    let size = f64::from(tile_size);
    let sin_y = (PI - 2.0 * PI * point.y / size).tanh();
    Coordinates::new(sin_y.asin().to_degrees(), 360.0 * (point.x / size - 0.5))
}

/// World pixels to the index of the containing tile.
pub fn pixels_to_tiles(tile_size: u32, zoom: u8, point: Point) -> TilePoint {
    let scale = zoom_scale(zoom) / f64::from(tile_size);
    TilePoint::new(
        (point.x * scale).floor() as i64,
        (point.y * scale).floor() as i64,
    )
}

/// World pixel position of a tile's north-west corner.
pub fn tiles_to_pixels(tile_size: u32, zoom: u8, point: TilePoint) -> Point {
    let scale = zoom_scale(zoom);
    let size = f64::from(tile_size);
    Point::new(
        point.x as f64 * size / scale,
        point.y as f64 * size / scale,
    )
}

pub fn degrees_to_tiles(tile_size: u32, zoom: u8, coordinates: Coordinates) -> TilePoint {
    pixels_to_tiles(tile_size, zoom, degrees_to_pixels(tile_size, coordinates))
}

pub fn tiles_to_degrees(tile_size: u32, zoom: u8, point: TilePoint) -> Coordinates {
    pixels_to_degrees(tile_size, tiles_to_pixels(tile_size, zoom, point))
}

/// Local pixel position of a tile's north-west corner.
pub fn tile_to_local_pixels(tile_size: u32, point: TilePoint) -> Point {
    let size = f64::from(tile_size);
    Point::new(point.x as f64 * size, point.y as f64 * size)
}

pub fn local_pixels_to_world_pixels(zoom: u8, point: Point) -> Point {
    let scale = zoom_scale(zoom);
    Point::new(point.x / scale, point.y / scale)
}

pub fn world_pixels_to_local_pixels(zoom: u8, point: Point) -> Point {
    let scale = zoom_scale(zoom);
    Point::new(point.x * scale, point.y * scale)
}

/// Pixel offset of `coordinates` from the north-west corner of `tile`.
///
/// Points outside the tile produce offsets outside `[0, tile_size)`.
pub fn degrees_to_inner_tile_coordinates(
    tile_size: u32,
    tile: Tile,
    coordinates: Coordinates,
) -> Point {
    let corner = tile_to_local_pixels(tile_size, tile.point);
    let local = world_pixels_to_local_pixels(tile.zoom, degrees_to_pixels(tile_size, coordinates));
    Point::new(local.x - corner.x, local.y - corner.y)
}
