pub mod coordinates;
pub mod math;
pub mod spiral;
pub mod tile;
pub mod visible;

// Foundation crate: pure tile and projection math, no I/O and no shared state.
pub use coordinates::*;
pub use math::*;
pub use spiral::*;
pub use tile::*;
pub use visible::*;
