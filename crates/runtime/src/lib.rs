// Runtime crate: async coordination primitives shared by the loader, the
// renderers and the layer orchestrator.

pub mod coalesce;
pub mod pool;
pub mod worker_pool;

pub use coalesce::*;
pub use pool::*;
pub use worker_pool::*;
