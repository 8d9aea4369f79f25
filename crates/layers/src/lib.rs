pub mod headless;
pub mod host;
pub mod layer;
pub mod orchestrator;
pub mod overlay;

pub use host::*;
pub use layer::*;
pub use orchestrator::*;
pub use overlay::*;
