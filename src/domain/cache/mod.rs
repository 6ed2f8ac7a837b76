//! Cache abstraction used for non-authorization read paths

pub mod repository;

pub use repository::{Cache, CacheExt};
