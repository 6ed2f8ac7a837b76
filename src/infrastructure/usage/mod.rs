//! Usage accounting infrastructure

pub mod in_memory;
pub mod postgres;
pub mod service;

pub use in_memory::InMemoryUsageRepository;
pub use postgres::PostgresUsageRepository;
pub use service::{MeteredRequest, UsageOutcome, UsageService};
