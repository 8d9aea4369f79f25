pub mod cache;
pub mod loader;
pub mod property;
pub mod range;
pub mod residency;
pub mod search;
pub mod source;

pub use cache::*;
pub use loader::*;
pub use property::*;
pub use range::*;
pub use residency::*;
pub use search::*;
pub use source::*;
