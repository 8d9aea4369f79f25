use foundation::{
    Coordinates, Point, Tile, TilePoint, degrees_to_pixels, degrees_to_tiles, tile_to_local_pixels,
    world_pixels_to_local_pixels,
};

use crate::host::SurfaceId;

/// Container for every rendered tile of one zoom level.
///
/// `position` is the tile under the viewport center when the layer was last
/// placed; canvases are laid out relative to it. `offset` is where that
/// tile's corner sits relative to the map center, in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub zoom: u8,
    pub position: TilePoint,
    pub offset: Point,
    pub element: SurfaceId,
}

/// A rendered tile and the surface holding its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub tile: Tile,
    pub element: SurfaceId,
}

/// Tile under `center` at `zoom`.
pub fn layer_position(tile_size: u32, zoom: u8, center: Coordinates) -> TilePoint {
    degrees_to_tiles(tile_size, zoom, center)
}

/// Pixel offset of tile `position`'s north-west corner from `center`.
pub fn layer_offset(tile_size: u32, zoom: u8, position: TilePoint, center: Coordinates) -> Point {
    let corner = tile_to_local_pixels(tile_size, position);
    let center = world_pixels_to_local_pixels(zoom, degrees_to_pixels(tile_size, center));
    Point::new(corner.x - center.x, corner.y - center.y)
}

/// Pixel position of `tile` inside a layer anchored at `position`.
pub fn canvas_position(tile_size: u32, tile: Tile, position: TilePoint) -> Point {
    let size = f64::from(tile_size);
    Point::new(
        (tile.point.x - position.x) as f64 * size,
        (tile.point.y - position.y) as f64 * size,
    )
}
