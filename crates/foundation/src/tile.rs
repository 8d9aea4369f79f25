use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in pixel space (world pixels or zoom-scaled local pixels).
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Integer tile-grid coordinates at some zoom level.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TilePoint {
    pub x: i64,
    pub y: i64,
}

impl TilePoint {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Deepest zoom difference [`Tile::covering_tiles`] enumerates (4^8 tiles).
pub const MAX_COVERING_SHIFT: u32 = 8;

/// Identity of one square raster tile.
///
/// Serializes as `{ "zoom": z, "point": { "x": x, "y": y } }`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub zoom: u8,
    pub point: TilePoint,
}

impl Tile {
    pub const fn new(zoom: u8, x: i64, y: i64) -> Self {
        Self {
            zoom,
            point: TilePoint::new(x, y),
        }
    }

    /// Stable string key, `"{zoom}-{x}-{y}"`.
    pub fn hash_key(&self) -> String {
        self.to_string()
    }

    /// Tiles at `zoom` that exactly cover this tile's footprint.
    ///
    /// Finer zooms yield every descendant in row-major order; coarser zooms
    /// yield the single ancestor. Descendants more than
    /// [`MAX_COVERING_SHIFT`] levels down are not enumerated and the result
    /// is empty.
    pub fn covering_tiles(&self, zoom: u8) -> Vec<Tile> {
        if zoom >= self.zoom {
            let shift = u32::from(zoom - self.zoom);
            if shift > MAX_COVERING_SHIFT {
                return Vec::new();
            }
            let span = 1i64 << shift;
            let origin = TilePoint::new(self.point.x << shift, self.point.y << shift);
            let mut tiles = Vec::with_capacity((span * span) as usize);
            for y in 0..span {
                for x in 0..span {
                    tiles.push(Tile::new(zoom, origin.x + x, origin.y + y));
                }
            }
            tiles
        } else {
            let shift = u32::from(self.zoom - zoom).min(i64::BITS - 1);
            vec![Tile::new(
                zoom,
                self.point.x >> shift,
                self.point.y >> shift,
            )]
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.zoom, self.point.x, self.point.y)
    }
}

/// `2^zoom` as an exact float.
#[inline]
pub fn zoom_scale(zoom: u8) -> f64 {
    2f64.powi(i32::from(zoom))
}

#[cfg(test)]
mod tests {
    use super::{MAX_COVERING_SHIFT, Tile, zoom_scale};
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_key_includes_every_field() {
        assert_eq!(Tile::new(13, 7395, 5026).hash_key(), "13-7395-5026");
        assert_eq!(Tile::new(0, -1, 2).hash_key(), "0--1-2");
        assert_ne!(
            Tile::new(1, 2, 3).hash_key(),
            Tile::new(1, 3, 2).hash_key()
        );
    }

    #[test]
    fn serializes_as_zoom_and_point() {
        let json = serde_json::to_string(&Tile::new(3, 4, 5)).unwrap();
        assert_eq!(json, r#"{"zoom":3,"point":{"x":4,"y":5}}"#);
        let back: Tile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Tile::new(3, 4, 5));
    }

    #[test]
    fn children_cover_parent() {
        let parent = Tile::new(4, 3, 5);
        assert_eq!(
            parent.covering_tiles(5),
            vec![
                Tile::new(5, 6, 10),
                Tile::new(5, 7, 10),
                Tile::new(5, 6, 11),
                Tile::new(5, 7, 11),
            ]
        );
        assert_eq!(parent.covering_tiles(4), vec![parent]);
        assert_eq!(parent.covering_tiles(6).len(), 16);
    }

    #[test]
    fn ancestor_covers_child() {
        assert_eq!(Tile::new(5, 7, 11).covering_tiles(4), vec![Tile::new(4, 3, 5)]);
        assert_eq!(Tile::new(5, 7, 11).covering_tiles(2), vec![Tile::new(2, 0, 1)]);
    }

    #[test]
    fn deep_or_extreme_zoom_gaps_stay_bounded() {
        let tile = Tile::new(2, 1, 3);
        let deepest = 2 + MAX_COVERING_SHIFT as u8;
        assert_eq!(tile.covering_tiles(deepest).len(), 1 << (2 * MAX_COVERING_SHIFT));
        assert!(tile.covering_tiles(deepest + 1).is_empty());
        assert!(tile.covering_tiles(u8::MAX).is_empty());

        let deep = Tile::new(u8::MAX, 12345, 678);
        assert_eq!(deep.covering_tiles(0), vec![Tile::new(0, 0, 0)]);
        assert_eq!(deep.covering_tiles(u8::MAX - 64), vec![Tile::new(u8::MAX - 64, 0, 0)]);
    }

    #[test]
    fn zoom_scale_is_a_power_of_two() {
        assert_eq!(zoom_scale(0), 1.0);
        assert_eq!(zoom_scale(13), 8192.0);
    }
}
