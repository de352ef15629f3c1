//! API request and response data models.
//!
//! These are distinct from the row shapes in [`crate::models`]: requests carry only what a caller
//! may set, and responses never echo secrets back.

pub mod instances;
pub mod messages;
pub mod settings;
