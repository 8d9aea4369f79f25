use serde::{Deserialize, Serialize};

/// Geographic coordinates in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Geographic rectangle.
///
/// Invariant: `north_west.latitude >= south_east.latitude` and
/// `north_west.longitude <= south_east.longitude`. Areas crossing the
/// antimeridian are not representable.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateArea {
    pub north_west: Coordinates,
    pub south_east: Coordinates,
}

impl CoordinateArea {
    pub const fn new(north_west: Coordinates, south_east: Coordinates) -> Self {
        Self {
            north_west,
            south_east,
        }
    }

    /// A zero-sized area at one coordinate.
    pub const fn point(at: Coordinates) -> Self {
        Self::new(at, at)
    }

    pub fn north(&self) -> f64 {
        self.north_west.latitude
    }

    pub fn south(&self) -> f64 {
        self.south_east.latitude
    }

    pub fn west(&self) -> f64 {
        self.north_west.longitude
    }

    pub fn east(&self) -> f64 {
        self.south_east.longitude
    }

    /// Arithmetic mean of the corners.
    pub fn center(&self) -> Coordinates {
        Coordinates::new(
            (self.north() + self.south()) / 2.0,
            (self.east() + self.west()) / 2.0,
        )
    }
}

/// Inclusive on every edge.
///
/// Points exactly on a shared border between two areas are inside both.
pub fn coordinate_is_inside_area(coordinates: Coordinates, area: &CoordinateArea) -> bool {
    coordinates.latitude >= area.south()
        && coordinates.latitude <= area.north()
        && coordinates.longitude >= area.west()
        && coordinates.longitude <= area.east()
}
