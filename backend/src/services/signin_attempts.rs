//! Failed sign-in tracking.
//!
//! Counts failures per user inside a fixed window. Reaching the limit
//! temp-blocks the user's active role assignment.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::repository::AuthzRepository;
use crate::services::authorization_service::AuthorizationService;

const BLOCK_REASON: &str = "too many failed sign-in attempts";

/// Result of recording a failed sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted; this many more are tolerated in the window.
    Counted { remaining: u32 },
    /// Limit reached and the active assignment was temp-blocked.
    Blocked,
    /// Limit reached but the user had no blockable assignment.
    LimitReached,
}

#[derive(Debug)]
pub struct SigninAttemptGuard {
    /// user id -> (failure count, window start)
    failures: Arc<RwLock<HashMap<i64, (u32, Instant)>>>,
    max_failures: u32,
    window: Duration,
}

impl SigninAttemptGuard {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            failures: Arc::new(RwLock::new(HashMap::new())),
            max_failures: max_failures.max(1),
            window,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.signin_max_failed_attempts, config.signin_failure_window)
    }

    /// Count a failure; on reaching the limit, block the user in one
    /// transaction, commit, then drop the user's cached permissions.
    pub async fn record_failure<R: AuthzRepository>(
        &self,
        authz: &AuthorizationService<R>,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let count = self.bump(user_id).await;
        if count < self.max_failures {
            return Ok(FailureOutcome::Counted {
                remaining: self.max_failures - count,
            });
        }

        self.failures.write().await.remove(&user_id);

        let mut tx = authz.begin_transaction().await?;
        let blocked = match authz
            .block_user_temporarily(&mut tx, user_id, BLOCK_REASON, now)
            .await
        {
            Ok(blocked) => blocked,
            Err(err) => {
                if let Err(rollback_err) = authz.rollback_transaction(tx).await {
                    warn!(user_id, error = %rollback_err, "Rollback failed");
                }
                return Err(err);
            }
        };
        authz.commit_transaction(tx).await?;
        authz
            .invalidate_user_cache_safe(user_id, "signin_attempts")
            .await;

        match blocked {
            Some(_) => {
                info!(user_id, attempts = count, "Sign-in failure limit reached");
                Ok(FailureOutcome::Blocked)
            }
            None => {
                warn!(user_id, "Sign-in failure limit reached without an active role");
                Ok(FailureOutcome::LimitReached)
            }
        }
    }

    /// Forget the user's failures after a successful sign-in.
    pub async fn record_success(&self, user_id: i64) {
        self.failures.write().await.remove(&user_id);
    }

    pub async fn failures(&self, user_id: i64) -> u32 {
        let now = Instant::now();
        match self.failures.read().await.get(&user_id) {
            Some((count, start)) if now.duration_since(*start) < self.window => *count,
            _ => 0,
        }
    }

    /// Drop entries whose window has passed; returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut failures = self.failures.write().await;
        let before = failures.len();
        failures.retain(|_, (_, start)| now.duration_since(*start) < self.window);
        before - failures.len()
    }

    async fn bump(&self, user_id: i64) -> u32 {
        let now = Instant::now();
        let mut failures = self.failures.write().await;
        let entry = failures.entry(user_id).or_insert((0, now));
        if now.duration_since(entry.1) >= self.window {
            *entry = (0, now);
        }
        entry.0 += 1;
        entry.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryPermissionCache;
    use crate::models::{NewRole, NewUserRole, UserRoleStatus};
    use crate::repository::MemoryAuthzRepository;
    use crate::services::authorization_service::AuthorizationSettings;

    async fn service() -> AuthorizationService<MemoryAuthzRepository> {
        let repo = Arc::new(MemoryAuthzRepository::new());
        repo.seed_role(
            10,
            NewRole {
                name: "Owner".into(),
                slug: "owner".into(),
                description: None,
                is_system_role: false,
            },
        )
        .await;
        repo.seed_user_role(
            1,
            NewUserRole {
                user_id: 7,
                role_id: 10,
                is_active: true,
                status: UserRoleStatus::Active,
                expires_at: None,
            },
        )
        .await;
        AuthorizationService::new(
            repo,
            Arc::new(MemoryPermissionCache::new()),
            AuthorizationSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_failures_below_limit_are_counted() {
        let authz = service().await;
        let guard = SigninAttemptGuard::new(3, Duration::from_secs(60));
        let now = Utc::now();

        assert_eq!(
            guard.record_failure(&authz, 7, now).await.unwrap(),
            FailureOutcome::Counted { remaining: 2 }
        );
        assert_eq!(
            guard.record_failure(&authz, 7, now).await.unwrap(),
            FailureOutcome::Counted { remaining: 1 }
        );
        assert_eq!(guard.failures(7).await, 2);
        assert!(!authz.is_user_temp_blocked(7, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_limit_blocks_and_resets() {
        let authz = service().await;
        let guard = SigninAttemptGuard::new(2, Duration::from_secs(60));
        let now = Utc::now();

        guard.record_failure(&authz, 7, now).await.unwrap();
        assert_eq!(
            guard.record_failure(&authz, 7, now).await.unwrap(),
            FailureOutcome::Blocked
        );
        assert_eq!(guard.failures(7).await, 0);
        assert!(authz.is_user_temp_blocked(7, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_limit_without_active_role() {
        let authz = service().await;
        let guard = SigninAttemptGuard::new(1, Duration::from_secs(60));
        assert_eq!(
            guard.record_failure(&authz, 99, Utc::now()).await.unwrap(),
            FailureOutcome::LimitReached
        );
    }

    #[tokio::test]
    async fn test_success_clears_counter() {
        let authz = service().await;
        let guard = SigninAttemptGuard::new(3, Duration::from_secs(60));
        guard.record_failure(&authz, 7, Utc::now()).await.unwrap();
        guard.record_success(7).await;
        assert_eq!(guard.failures(7).await, 0);
    }

    #[tokio::test]
    async fn test_window_expiry_restarts_count() {
        let authz = service().await;
        let guard = SigninAttemptGuard::new(2, Duration::from_millis(20));
        guard.record_failure(&authz, 7, Utc::now()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(guard.cleanup_expired().await, 1);
        assert_eq!(guard.failures(7).await, 0);
        assert_eq!(
            guard.record_failure(&authz, 7, Utc::now()).await.unwrap(),
            FailureOutcome::Counted { remaining: 1 }
        );
    }
}
