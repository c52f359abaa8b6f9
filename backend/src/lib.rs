//! Realty Backend - Library
//!
//! Role-based authorization, permission caching and session lifecycle for the
//! real-estate marketplace API.

#[macro_use]
mod macros;

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
