//! HTTP request handlers for all API endpoints.
//!
//! Each handler validates its input, calls the stores and clients held in [`crate::AppState`] and
//! returns [`crate::errors::Error`] on failure, which renders as a JSON error with the matching
//! status code.
//!
//! # Handler Modules
//!
//! - [`instances`]: instance CRUD, reload, reconciliation and pairing
//! - [`settings`]: the settings singleton
//! - [`messages`]: send, schedule and message history
//! - [`content`]: products, blog posts and courses

pub mod content;
pub mod instances;
pub mod messages;
pub mod settings;
