//! User-role assignment and the temp-block lifecycle.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::AuthorizationService;
use crate::error::{AppError, Result};
use crate::models::{NewUserRole, UserRole, UserRoleStatus};
use crate::repository::AuthzRepository;
use crate::services::metrics_service;

impl<R: AuthzRepository> AuthorizationService<R> {
    /// Give a user an additional (inactive) role assignment.
    #[instrument(name = "authz.assign_role_to_user", skip(self), err)]
    pub async fn assign_role_to_user(
        &self,
        user_id: i64,
        role_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<UserRole> {
        let mut tx = self.repo.begin().await?;
        let result = self
            .assign_role_in_tx(&mut tx, user_id, role_id, expires_at)
            .await;
        let assignment = self.finish(tx, result).await?;
        info!(user_id, role_id, "Role assigned to user");
        Ok(assignment)
    }

    /// Make `role_id` the user's only active assignment.
    ///
    /// Returns `None` and writes nothing when the user holds no such role, so
    /// the current active assignment survives a rejected switch.
    #[instrument(name = "authz.switch_active_role", skip(self), err)]
    pub async fn switch_active_role(&self, user_id: i64, role_id: i64) -> Result<Option<UserRole>> {
        let mut tx = self.repo.begin().await?;
        let result = self.switch_active_role_in_tx(&mut tx, user_id, role_id).await;
        let activated = self.finish(tx, result).await?;
        match &activated {
            Some(_) => {
                self.invalidate_user_cache_safe(user_id, "switch_active_role")
                    .await;
                info!(user_id, role_id, "Active role switched");
            }
            None => warn!(user_id, role_id, "Active role switch found no assignment"),
        }
        Ok(activated)
    }

    #[instrument(name = "authz.list_user_roles", skip(self), err)]
    pub async fn list_user_roles(&self, user_id: i64) -> Result<Vec<UserRole>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .list_user_roles_for_user(&mut tx, user_id)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    /// Temp-block the user's active assignment inside the caller's transaction.
    ///
    /// The caller commits and then calls [`Self::invalidate_user_cache_safe`].
    /// Returns `None` when the user has no active assignment that can be blocked.
    #[instrument(name = "authz.block_user_temporarily", skip(self, tx), err)]
    pub async fn block_user_temporarily(
        &self,
        tx: &mut R::Tx,
        user_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRole>> {
        let until = now + self.settings.temp_block_duration;
        let blocked = self
            .repo
            .block_user_temporarily(tx, user_id, until, reason, now)
            .await?;
        if blocked.is_some() {
            metrics_service::record_temp_block();
            info!(user_id, %until, reason, "User temporarily blocked");
        }
        Ok(blocked)
    }

    /// Move the user's assignment from `temp_blocked` back to `active` inside
    /// the caller's transaction. `None` when nothing was blocked.
    #[instrument(name = "authz.unblock_user", skip(self, tx), err)]
    pub async fn unblock_user(
        &self,
        tx: &mut R::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRole>> {
        let unblocked = self.repo.unblock_user(tx, user_id, now).await?;
        if unblocked.is_some() {
            info!(user_id, "User unblocked");
        }
        Ok(unblocked)
    }

    /// Block in a transaction of its own and drop the user's cache.
    #[instrument(name = "authz.temp_block_user", skip(self), err)]
    pub async fn temp_block_user(
        &self,
        user_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRole>> {
        let mut tx = self.repo.begin().await?;
        let result = self.block_user_temporarily(&mut tx, user_id, reason, now).await;
        let blocked = self.finish(tx, result).await?;
        self.invalidate_user_cache_safe(user_id, "temp_block_user").await;
        Ok(blocked)
    }

    /// Unblock in a transaction of its own and drop the user's cache.
    #[instrument(name = "authz.lift_temp_block", skip(self), err)]
    pub async fn lift_temp_block(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<UserRole>> {
        let mut tx = self.repo.begin().await?;
        let result = self.unblock_user(&mut tx, user_id, now).await;
        let unblocked = self.finish(tx, result).await?;
        self.invalidate_user_cache_safe(user_id, "lift_temp_block").await;
        Ok(unblocked)
    }

    /// Lift the user's block only if its deadline is still at or before `now`.
    ///
    /// A block renewed after the caller listed it is left in place.
    #[instrument(name = "authz.lift_expired_temp_block", skip(self), err)]
    pub async fn lift_expired_temp_block(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRole>> {
        let mut tx = self.repo.begin().await?;
        let result = self
            .repo
            .unblock_expired_user(&mut tx, user_id, now)
            .await
            .map_err(Into::into);
        let unblocked = self.finish(tx, result).await?;
        if unblocked.is_some() {
            self.invalidate_user_cache_safe(user_id, "lift_expired_temp_block")
                .await;
            info!(user_id, "Elapsed block lifted");
        }
        Ok(unblocked)
    }

    /// True only while the active assignment is temp-blocked with a deadline
    /// after `now`. An elapsed block reads as unblocked before the sweeper
    /// rewrites the row.
    #[instrument(name = "authz.is_user_temp_blocked", skip(self), err)]
    pub async fn is_user_temp_blocked(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .active_user_role_for(&mut tx, user_id, now)
            .await
            .map_err(Into::into);
        let active = self.finish(tx, result).await?;
        Ok(active.is_some_and(|ur| ur.is_temp_blocked(now)))
    }

    /// Temp-blocked assignments whose deadline is at or before `now`.
    #[instrument(name = "authz.expired_temp_blocked_users", skip(self), err)]
    pub async fn expired_temp_blocked_users(&self, now: DateTime<Utc>) -> Result<Vec<UserRole>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .expired_temp_blocked_user_roles(&mut tx, now)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    async fn assign_role_in_tx(
        &self,
        tx: &mut R::Tx,
        user_id: i64,
        role_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<UserRole> {
        if self.repo.get_role_by_id(tx, role_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Role {} not found", role_id)));
        }
        if self.repo.get_user_role(tx, user_id, role_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "User {} already has role {}",
                user_id, role_id
            )));
        }
        let assignment = NewUserRole {
            user_id,
            role_id,
            is_active: false,
            status: UserRoleStatus::Active,
            expires_at,
        };
        Ok(self.repo.create_user_role(tx, &assignment).await?)
    }

    async fn switch_active_role_in_tx(
        &self,
        tx: &mut R::Tx,
        user_id: i64,
        role_id: i64,
    ) -> Result<Option<UserRole>> {
        if self.repo.get_user_role(tx, user_id, role_id).await?.is_none() {
            return Ok(None);
        }
        self.repo.deactivate_all_user_roles(tx, user_id).await?;
        Ok(self.repo.activate_user_role(tx, user_id, role_id).await?)
    }
}
