//! Utility functions for identifiers and timestamps.

pub mod timestamps;

use uuid::Uuid;

pub use timestamps::{from_millis, is_older_than_days, now_millis, Timestamp};

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new plan execution id.
#[must_use]
pub fn generate_execution_id() -> String {
    generate_uuid().simple().to_string()
}
