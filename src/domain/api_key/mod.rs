//! API key domain: entity, validation rules, repository trait

pub mod entity;
pub mod repository;
pub mod validation;

pub use entity::{ApiKey, ApiKeyId, KeyMetadata, Scope};
pub use repository::{CurrentUsage, KeyRepository, UsageDecision};
pub use validation::{
    is_valid_scope, is_valid_secret_format, parse_scope, parse_scopes, validate_key_name,
    ApiKeyValidationError, DISPLAY_PREFIX_LENGTH, MIN_SECRET_LENGTH, SECRET_PREFIX,
};
