//! Domain layer: entities, validation rules, and the traits the
//! infrastructure implements

pub mod api_key;
pub mod cache;
pub mod error;
pub mod tier;
pub mod usage;

pub use error::{AuthError, DomainError};
pub use tier::PricingTier;
