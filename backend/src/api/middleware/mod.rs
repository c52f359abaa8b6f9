//! API middleware.

pub mod auth;
pub mod permission;
pub mod security_headers;
pub mod tracing;
