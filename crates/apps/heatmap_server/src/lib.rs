pub mod client;
pub mod listings;
pub mod service;

pub use client::*;
pub use listings::*;
pub use service::*;
