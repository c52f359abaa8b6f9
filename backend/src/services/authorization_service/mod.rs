//! Authorization service.
//!
//! Orchestrates the repository, the permission cache and the condition
//! evaluator. Multi-step writes run in one transaction; the set of users whose
//! permissions may change is computed inside that transaction and their cache
//! entries are dropped only after the commit succeeds.

mod cache;
mod permissions;
mod role_permissions;
mod roles;
mod user_roles;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::cache::PermissionCache;
use crate::config::Config;
use crate::error::Result;
use crate::models::{HttpAction, Permission, PermissionContext, UserRole};
use crate::repository::AuthzRepository;
use crate::services::condition_evaluator;
use crate::services::metrics_service;

/// Tunables taken from [`Config`].
#[derive(Debug, Clone)]
pub struct AuthorizationSettings {
    pub admin_role_slug: String,
    pub cache_ttl: Duration,
    pub temp_block_duration: chrono::Duration,
}

impl AuthorizationSettings {
    /// `Config::validate` rejects block durations chrono cannot hold; an
    /// unvalidated config falls back to 15 minutes with a warning.
    pub fn from_config(config: &Config) -> Self {
        let temp_block_duration = chrono::Duration::from_std(config.temp_block_duration)
            .unwrap_or_else(|e| {
                warn!(
                    configured = ?config.temp_block_duration,
                    error = %e,
                    "Temp block duration out of range, using 15 minutes"
                );
                chrono::Duration::minutes(15)
            });
        Self {
            admin_role_slug: config.admin_role_slug.clone(),
            cache_ttl: config.permission_cache_ttl,
            temp_block_duration,
        }
    }
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self::from_config(&Config::for_testing())
    }
}

/// Which permissions a check is about.
enum Target<'a> {
    Http(&'a HttpAction),
    Resource { resource: &'a str, action: &'a str },
}

impl Target<'_> {
    fn matches(&self, permission: &Permission) -> bool {
        match self {
            Target::Http(action) => {
                HttpAction::parse(&permission.action).is_some_and(|stored| stored == **action)
            }
            Target::Resource { resource, action } => {
                permission.matches_resource_action(resource, action)
            }
        }
    }

    fn decision_key(&self) -> String {
        match self {
            Target::Http(action) => action.as_action(),
            Target::Resource { resource, action } => {
                format!("{}:{}", resource.to_ascii_lowercase(), action.to_ascii_lowercase())
            }
        }
    }
}

/// Authorization and session-lifecycle service.
pub struct AuthorizationService<R: AuthzRepository> {
    repo: Arc<R>,
    cache: Arc<dyn PermissionCache>,
    settings: AuthorizationSettings,
}

impl<R: AuthzRepository> AuthorizationService<R> {
    pub fn new(
        repo: Arc<R>,
        cache: Arc<dyn PermissionCache>,
        settings: AuthorizationSettings,
    ) -> Self {
        Self {
            repo,
            cache,
            settings,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn cache(&self) -> &Arc<dyn PermissionCache> {
        &self.cache
    }

    pub fn settings(&self) -> &AuthorizationSettings {
        &self.settings
    }

    // Transactions

    pub async fn begin_transaction(&self) -> Result<R::Tx> {
        Ok(self.repo.begin().await?)
    }

    pub async fn commit_transaction(&self, tx: R::Tx) -> Result<()> {
        Ok(self.repo.commit(tx).await?)
    }

    pub async fn rollback_transaction(&self, tx: R::Tx) -> Result<()> {
        Ok(self.repo.rollback(tx).await?)
    }

    /// Commit on success, roll back on failure.
    async fn finish<T>(&self, tx: R::Tx, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.repo.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.repo.rollback(tx).await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    // Queries

    /// Whether the user may call `method path`. `path` is the route pattern.
    #[instrument(name = "authz.has_http_permission", skip(self), err)]
    pub async fn has_http_permission(&self, user_id: i64, method: &str, path: &str) -> Result<bool> {
        let ctx = PermissionContext::new(user_id, 0);
        self.has_http_permission_with_context(method, path, &ctx)
            .await
    }

    /// HTTP check with request metadata available to conditions.
    #[instrument(
        name = "authz.has_http_permission_with_context",
        skip(self, ctx),
        fields(user_id = ctx.user_id),
        err
    )]
    pub async fn has_http_permission_with_context(
        &self,
        method: &str,
        path: &str,
        ctx: &PermissionContext,
    ) -> Result<bool> {
        let action = HttpAction::new(method, path);
        self.check(ctx, Target::Http(&action)).await
    }

    /// Whether the user may perform `action` on `resource`.
    #[instrument(name = "authz.has_permission", skip(self, ctx), err)]
    pub async fn has_permission(
        &self,
        user_id: i64,
        resource: &str,
        action: &str,
        ctx: &PermissionContext,
    ) -> Result<bool> {
        let mut ctx = ctx.clone();
        ctx.user_id = user_id;
        self.check(&ctx, Target::Resource { resource, action }).await
    }

    async fn check(&self, ctx: &PermissionContext, target: Target<'_>) -> Result<bool> {
        let user_id = ctx.user_id;
        let now = Utc::now();

        let active = match self.get_active_user_role(user_id).await? {
            Some(active) if active.permits_authorization(now) => active,
            _ => {
                metrics_service::record_authz_check("no_active_role");
                return Ok(false);
            }
        };

        let key = target.decision_key();
        match self.cache.get_decision(user_id, &key).await {
            Ok(Some(allowed)) => {
                metrics_service::record_authz_check(if allowed { "allow" } else { "deny" });
                return Ok(allowed);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, user_id, "Decision cache read failed"),
        }

        let permissions = self.effective_permissions(user_id, now).await?;
        let matched: Vec<&Permission> = permissions.iter().filter(|p| target.matches(p)).collect();

        // Decisions that do not depend on the request are memoized.
        let context_free = if matched.is_empty() {
            Some(false)
        } else if matched.iter().any(|p| p.is_unconditional()) {
            Some(true)
        } else {
            None
        };

        let allowed = match context_free {
            Some(allowed) => {
                if let Err(err) = self
                    .cache
                    .put_decision(user_id, &key, allowed, self.settings.cache_ttl)
                    .await
                {
                    warn!(error = %err, user_id, "Decision cache write failed");
                }
                allowed
            }
            None => {
                let mut ctx = ctx.clone();
                if ctx.user_role_id <= 0 {
                    ctx.user_role_id = active.id;
                }
                matched
                    .iter()
                    .any(|p| condition_evaluator::evaluate(p.conditions.as_ref(), &ctx))
            }
        };

        metrics_service::record_authz_check(if allowed { "allow" } else { "deny" });
        Ok(allowed)
    }

    /// Effective permission set of the user (cache-through).
    #[instrument(name = "authz.get_user_permissions", skip(self), err)]
    pub async fn get_user_permissions(&self, user_id: i64) -> Result<Vec<Permission>> {
        let permissions = self.effective_permissions(user_id, Utc::now()).await?;
        Ok(permissions.as_ref().clone())
    }

    /// Active permissions granted to a role.
    #[instrument(name = "authz.get_role_permissions", skip(self), err)]
    pub async fn get_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .granted_permissions_for_role(&mut tx, role_id)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    #[instrument(name = "authz.get_active_user_role", skip(self), err)]
    pub async fn get_active_user_role(&self, user_id: i64) -> Result<Option<UserRole>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .active_user_role_for(&mut tx, user_id, Utc::now())
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    async fn effective_permissions(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<Permission>>> {
        match self.cache.get_effective(user_id).await {
            Ok(Some(permissions)) => {
                metrics_service::record_cache_lookup(true);
                return Ok(permissions);
            }
            Ok(None) => metrics_service::record_cache_lookup(false),
            Err(err) => warn!(error = %err, user_id, "Permission cache read failed"),
        }

        let permissions = Arc::new(self.load_effective_permissions(user_id, now).await?);
        if let Err(err) = self
            .cache
            .put_effective(user_id, permissions.clone(), self.settings.cache_ttl)
            .await
        {
            warn!(error = %err, user_id, "Permission cache write failed");
        }
        Ok(permissions)
    }

    async fn load_effective_permissions(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Permission>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .effective_permissions_for_user(&mut tx, user_id, now)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    /// Users currently holding any role that grants `permission_id`.
    async fn users_for_permission(
        &self,
        tx: &mut R::Tx,
        permission_id: i64,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<i64>> {
        let mut users = BTreeSet::new();
        for role_id in self.repo.role_ids_for_permission(tx, permission_id).await? {
            users.extend(self.repo.active_user_ids_for_role(tx, role_id, now).await?);
        }
        Ok(users)
    }

    async fn users_for_role(
        &self,
        tx: &mut R::Tx,
        role_id: i64,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<i64>> {
        Ok(self
            .repo
            .active_user_ids_for_role(tx, role_id, now)
            .await?
            .into_iter()
            .collect())
    }
}
