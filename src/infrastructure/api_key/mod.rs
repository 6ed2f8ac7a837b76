//! API key infrastructure: generation, repositories, service

pub mod generator;
pub mod in_memory;
pub mod postgres;
pub mod rate_limiter;
pub mod service;

pub use generator::{GeneratedKey, KeyGenerator};
pub use in_memory::InMemoryKeyRepository;
pub use postgres::PostgresKeyRepository;
pub use rate_limiter::{RateLimitResult, RateLimiter};
pub use service::{ApiKeyService, CreateKeyOptions, CreatedKey, DEFAULT_PERSISTENCE_TIMEOUT};
