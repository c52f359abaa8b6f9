//! DashMap-backed TTL cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheResult, CacheStats, PermissionCache};
use crate::models::Permission;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process permission cache shared by all request handlers.
#[derive(Debug, Default)]
pub struct MemoryPermissionCache {
    effective: DashMap<i64, Entry<Arc<Vec<Permission>>>>,
    decisions: DashMap<(i64, String), Entry<bool>>,
}

impl MemoryPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.effective.len() + self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PermissionCache for MemoryPermissionCache {
    async fn get_effective(&self, user_id: i64) -> CacheResult<Option<Arc<Vec<Permission>>>> {
        let now = Instant::now();
        if let Some(entry) = self.effective.get(&user_id) {
            if entry.is_fresh(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.effective.remove_if(&user_id, |_, entry| !entry.is_fresh(now));
        Ok(None)
    }

    async fn put_effective(
        &self,
        user_id: i64,
        permissions: Arc<Vec<Permission>>,
        ttl: Duration,
    ) -> CacheResult<()> {
        self.effective.insert(user_id, Entry::new(permissions, ttl));
        Ok(())
    }

    async fn invalidate_user(&self, user_id: i64) -> CacheResult<()> {
        self.effective.remove(&user_id);
        Ok(())
    }

    async fn invalidate_granular(&self, user_id: i64) -> CacheResult<()> {
        self.decisions.retain(|(uid, _), _| *uid != user_id);
        Ok(())
    }

    async fn get_decision(&self, user_id: i64, action: &str) -> CacheResult<Option<bool>> {
        let key = (user_id, action.to_string());
        let now = Instant::now();
        if let Some(entry) = self.decisions.get(&key) {
            if entry.is_fresh(now) {
                return Ok(Some(entry.value));
            }
        }
        self.decisions.remove_if(&key, |_, entry| !entry.is_fresh(now));
        Ok(None)
    }

    async fn put_decision(
        &self,
        user_id: i64,
        action: &str,
        allowed: bool,
        ttl: Duration,
    ) -> CacheResult<()> {
        self.decisions
            .insert((user_id, action.to_string()), Entry::new(allowed, ttl));
        Ok(())
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let before = self.len();
        self.effective.retain(|_, entry| entry.is_fresh(now));
        self.decisions.retain(|_, entry| entry.is_fresh(now));
        Ok(before.saturating_sub(self.len()))
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            effective_entries: self.effective.len(),
            decision_entries: self.decisions.len(),
        }
    }
}
