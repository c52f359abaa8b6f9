//! Cache control.

use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::AuthorizationService;
use crate::error::Result;
use crate::models::Permission;
use crate::repository::AuthzRepository;

impl<R: AuthzRepository> AuthorizationService<R> {
    /// Drop every cached entry of the user, surfacing cache failures.
    #[instrument(name = "authz.invalidate_user_cache", skip(self), err)]
    pub async fn invalidate_user_cache(&self, user_id: i64, source: &str) -> Result<()> {
        self.cache.invalidate_user(user_id).await?;
        self.cache.invalidate_granular(user_id).await?;
        debug!(user_id, source, "Permission cache invalidated");
        Ok(())
    }

    /// Drop every cached entry of the user; failures are logged and TTL bounds
    /// the staleness.
    pub async fn invalidate_user_cache_safe(&self, user_id: i64, source: &str) {
        if let Err(err) = self.invalidate_user_cache(user_id, source).await {
            warn!(user_id, source, error = %err, "Permission cache invalidation failed");
        }
    }

    /// Best-effort invalidation of a fan-out set after a commit.
    pub(super) async fn invalidate_users<I>(&self, users: I, source: &str)
    where
        I: IntoIterator<Item = i64>,
    {
        for user_id in users {
            self.invalidate_user_cache_safe(user_id, source).await;
        }
    }

    /// Invalidate, then reload the effective set into the cache.
    #[instrument(name = "authz.refresh_user_permissions", skip(self), err)]
    pub async fn refresh_user_permissions(&self, user_id: i64) -> Result<Vec<Permission>> {
        self.invalidate_user_cache(user_id, "refresh_user_permissions")
            .await?;
        let permissions = self.effective_permissions(user_id, Utc::now()).await?;
        Ok(permissions.as_ref().clone())
    }
}
