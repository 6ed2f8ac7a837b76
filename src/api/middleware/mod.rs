//! Request middleware and extractors

pub mod auth;

pub use auth::{MeteredApiKey, RequireAdminKey, RequireApiKey};
