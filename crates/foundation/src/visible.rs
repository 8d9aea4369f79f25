use crate::coordinates::CoordinateArea;
use crate::math::projection::{degrees_to_tiles, tiles_to_degrees};
use crate::spiral::{TileBounds, spiral_loop};
use crate::tile::{Tile, TilePoint};

/// Integer tile box covering `area` at `zoom`.
pub fn tile_bounds(tile_size: u32, zoom: u8, area: &CoordinateArea) -> TileBounds {
    TileBounds::new(
        degrees_to_tiles(tile_size, zoom, area.north_west),
        degrees_to_tiles(tile_size, zoom, area.south_east),
    )
}

/// Every tile touching `area`, center tile first and then outward in rings.
///
/// The ordering is part of the contract: callers render in this order so the
/// middle of the viewport fills in first.
pub fn calculate_visible_tiles(tile_size: u32, zoom: u8, area: &CoordinateArea) -> Vec<Tile> {
    let mut tiles = Vec::new();
    spiral_loop(tile_bounds(tile_size, zoom, area), |point| {
        tiles.push(Tile { zoom, point });
    });
    tiles
}

/// Geographic rectangle exactly covering `tile`.
pub fn tile_to_area(tile_size: u32, tile: Tile) -> CoordinateArea {
    let TilePoint { x, y } = tile.point;
    CoordinateArea::new(
        tiles_to_degrees(tile_size, tile.zoom, TilePoint::new(x, y)),
        tiles_to_degrees(tile_size, tile.zoom, TilePoint::new(x + 1, y + 1)),
    )
}
