use crate::tile::TilePoint;

/// Inclusive integer bounding box on the tile grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileBounds {
    pub min: TilePoint,
    pub max: TilePoint,
}

impl TileBounds {
    pub const fn new(min: TilePoint, max: TilePoint) -> Self {
        Self { min, max }
    }

    pub fn contains_x(&self, x: i64) -> bool {
        x >= self.min.x && x <= self.max.x
    }

    pub fn contains_y(&self, y: i64) -> bool {
        y >= self.min.y && y <= self.max.y
    }

    /// The cell the spiral starts from, `floor` of the box midpoint.
    pub fn center(&self) -> TilePoint {
        TilePoint::new(
            (self.min.x + self.max.x).div_euclid(2),
            (self.min.y + self.max.y).div_euclid(2),
        )
    }
}

/// Visits every cell of `bounds` in rings of growing Chebyshev distance from
/// the center.
///
/// Each ring walks its north side west→east, its east side north→south, its
/// south side east→west and its west side south→north. Cells outside `bounds`
/// are skipped, and the walk stops after the first ring that yields nothing.
pub fn spiral_loop(bounds: TileBounds, mut visit: impl FnMut(TilePoint)) {
    let start = bounds.center();
    let mut ring: i64 = 0;

    loop {
        let mut visited = false;
        let mut emit = |x: i64, y: i64| {
            visited = true;
            visit(TilePoint::new(x, y));
        };

        let north = start.y - ring;
        if bounds.contains_y(north) {
            for dx in -ring..=ring {
                if bounds.contains_x(start.x + dx) {
                    emit(start.x + dx, north);
                }
            }
        }

        let east = start.x + ring;
        if bounds.contains_x(east) {
            for dy in (-ring + 1)..=ring {
                if bounds.contains_y(start.y + dy) {
                    emit(east, start.y + dy);
                }
            }
        }

        let south = start.y + ring;
        if bounds.contains_y(south) {
            for dx in (-ring..ring).rev() {
                if bounds.contains_x(start.x + dx) {
                    emit(start.x + dx, south);
                }
            }
        }

        let west = start.x - ring;
        if bounds.contains_x(west) {
            for dy in ((-ring + 1)..ring).rev() {
                if bounds.contains_y(start.y + dy) {
                    emit(west, start.y + dy);
                }
            }
        }

        if !visited {
            break;
        }
        ring += 1;
    }
}

pub fn spiral_points(bounds: TileBounds) -> Vec<TilePoint> {
    let mut points = Vec::new();
    spiral_loop(bounds, |p| points.push(p));
    points
}
