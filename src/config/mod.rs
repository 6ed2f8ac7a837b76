//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, CacheConfig, LogFormat, LoggingConfig, ServerConfig, StorageConfig,
};
