//! Back-office JSON API.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! # API Structure
//!
//! Everything lives under `/admin/api/v1`:
//!
//! - **Instances** (`/instances/*`): messaging instances, reconciliation and pairing
//! - **Settings** (`/settings`): the gateway credentials and default instance
//! - **Messages** (`/messages`): send, schedule and history
//! - **Content** (`/content/{kind}/*`): products, blog posts and courses
//!
//! `/healthz` sits outside the prefix.

pub mod handlers;
pub mod models;
