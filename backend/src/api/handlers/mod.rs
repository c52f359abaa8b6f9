//! HTTP request handlers.

pub mod health;
pub mod permissions;
pub mod role_permissions;
pub mod roles;
pub mod user_roles;
