//! Usage metering domain: append-only records and their repository

pub mod record;
pub mod repository;

pub use record::{UsageRecord, UsageRecordId};
pub use repository::{UsageQuery, UsageRepository};
