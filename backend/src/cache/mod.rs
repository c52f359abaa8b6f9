//! Per-user permission cache.
//!
//! The store of record is the repository; entries here only memoize reads and
//! expire after a bounded TTL so a lost invalidation heals on its own.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::Permission;

pub use memory::MemoryPermissionCache;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Entry counts for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub effective_entries: usize,
    pub decision_entries: usize,
}

#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Effective permission set of a user, if cached and fresh.
    async fn get_effective(&self, user_id: i64) -> CacheResult<Option<Arc<Vec<Permission>>>>;

    async fn put_effective(
        &self,
        user_id: i64,
        permissions: Arc<Vec<Permission>>,
        ttl: Duration,
    ) -> CacheResult<()>;

    async fn invalidate_user(&self, user_id: i64) -> CacheResult<()>;

    /// Drop every auxiliary key scoped to the user (memoized decisions).
    async fn invalidate_granular(&self, user_id: i64) -> CacheResult<()>;

    /// Memoized context-free decision for `(user, action)`.
    async fn get_decision(&self, user_id: i64, action: &str) -> CacheResult<Option<bool>>;

    async fn put_decision(
        &self,
        user_id: i64,
        action: &str,
        allowed: bool,
        ttl: Duration,
    ) -> CacheResult<()>;

    /// Remove expired entries; returns how many were dropped.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
