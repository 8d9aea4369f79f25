pub mod config;
pub mod gaussian;
pub mod grid;
pub mod price_grid;
pub mod raster;
pub mod renderer;
pub mod worker;

pub use config::*;
pub use gaussian::*;
pub use grid::*;
pub use price_grid::*;
pub use raster::*;
pub use renderer::*;
pub use worker::*;
