use foundation::{CoordinateArea, Coordinates, Point};
use tokio::sync::mpsc::UnboundedSender;

/// Geographic viewport edges in degrees, as reported by the map host.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub const fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    pub fn to_area(&self) -> CoordinateArea {
        CoordinateArea::new(
            Coordinates::new(self.north, self.west),
            Coordinates::new(self.south, self.east),
        )
    }

    /// Arithmetic mean of the edges. Wrong across the antimeridian.
    pub fn center(&self) -> Coordinates {
        Coordinates::new(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }
}

impl From<CoordinateArea> for Bounds {
    fn from(area: CoordinateArea) -> Self {
        Self::new(area.north(), area.south(), area.east(), area.west())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MapEvent {
    BoundsChanged,
    ZoomChanged,
    /// The viewport settled after a pan or zoom.
    Idle,
}

/// Removable registration with a map host. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The slippy-map widget the heatmap is drawn over.
pub trait MapHost: Send + Sync {
    fn zoom(&self) -> u8;

    /// `None` before the map has been laid out.
    fn bounds(&self) -> Option<Bounds>;

    /// Delivers every subsequent map event to `events` until the returned
    /// subscription is dropped.
    fn subscribe(&self, events: UnboundedSender<MapEvent>) -> Subscription;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u64);

/// Factory and mutator for drawable surfaces (canvases) and the containers
/// grouping them.
pub trait Surfaces: Send {
    fn create_container(&mut self) -> SurfaceId;

    fn create_surface(&mut self, width: u32, height: u32) -> SurfaceId;

    /// Writes a row-major RGBA buffer into a surface.
    fn paint_pixels(&mut self, surface: SurfaceId, rgba: &[u8]);

    fn attach(&mut self, child: SurfaceId, parent: SurfaceId);

    /// Detaches and destroys a surface.
    fn detach(&mut self, surface: SurfaceId);

    /// Pixel position relative to the parent.
    fn set_position(&mut self, surface: SurfaceId, position: Point);
}
