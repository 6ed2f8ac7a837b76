//! Infrastructure layer: repository implementations, services, logging

pub mod api_key;
pub mod cache;
pub mod logging;
pub mod usage;
