//! Role-permission grants.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, instrument};

use super::permissions::validate_conditions;
use super::AuthorizationService;
use crate::error::{AppError, Result};
use crate::models::{
    NewRolePermission, Page, PageRequest, RolePermission, RolePermissionFilter,
    RolePermissionUpdate,
};
use crate::repository::AuthzRepository;

fn grant_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Role permission {} not found", id))
}

impl<R: AuthzRepository> AuthorizationService<R> {
    /// Link a permission to a role and drop the cache of the role's users.
    #[instrument(name = "authz.create_role_permission", skip(self), err)]
    pub async fn create_role_permission(&self, input: NewRolePermission) -> Result<RolePermission> {
        let input = NewRolePermission {
            conditions: input.conditions.filter(|c| !c.is_null()),
            ..input
        };
        validate_conditions(input.conditions.as_ref())?;

        let mut tx = self.repo.begin().await?;
        let result = self.create_role_permission_in_tx(&mut tx, &input).await;
        let (grant, affected) = self.finish(tx, result).await?;
        self.invalidate_users(affected, "create_role_permission").await;
        info!(
            role_id = grant.role_id,
            permission_id = grant.permission_id,
            granted = grant.granted,
            "Role permission created"
        );
        Ok(grant)
    }

    #[instrument(name = "authz.get_role_permission", skip(self), err)]
    pub async fn get_role_permission(&self, id: i64) -> Result<RolePermission> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .get_role_permission_by_id(&mut tx, id)
            .await
            .map_err(Into::into);
        self.finish(tx, result)
            .await?
            .ok_or_else(|| grant_not_found(id))
    }

    #[instrument(name = "authz.update_role_permission", skip(self, update), err)]
    pub async fn update_role_permission(
        &self,
        id: i64,
        update: RolePermissionUpdate,
    ) -> Result<RolePermission> {
        validate_conditions(update.conditions.as_value())?;

        let mut tx = self.repo.begin().await?;
        let result = self.update_role_permission_in_tx(&mut tx, id, update).await;
        let (grant, affected) = self.finish(tx, result).await?;
        self.invalidate_users(affected, "update_role_permission").await;
        Ok(grant)
    }

    #[instrument(name = "authz.delete_role_permission", skip(self), err)]
    pub async fn delete_role_permission(&self, id: i64) -> Result<()> {
        let mut tx = self.repo.begin().await?;
        let result = self.delete_role_permission_in_tx(&mut tx, id).await;
        let affected = self.finish(tx, result).await?;
        self.invalidate_users(affected, "delete_role_permission").await;
        Ok(())
    }

    /// Grant `permission_id` to `role_id` without conditions.
    #[instrument(name = "authz.grant_permission_to_role", skip(self), err)]
    pub async fn grant_permission_to_role(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<RolePermission> {
        self.create_role_permission(NewRolePermission {
            role_id,
            permission_id,
            granted: true,
            conditions: None,
        })
        .await
    }

    /// Remove the `(role_id, permission_id)` link.
    #[instrument(name = "authz.revoke_permission_from_role", skip(self), err)]
    pub async fn revoke_permission_from_role(&self, role_id: i64, permission_id: i64) -> Result<()> {
        let mut tx = self.repo.begin().await?;
        let result = self
            .revoke_permission_in_tx(&mut tx, role_id, permission_id)
            .await;
        let affected = self.finish(tx, result).await?;
        self.invalidate_users(affected, "revoke_permission_from_role")
            .await;
        info!(role_id, permission_id, "Permission revoked from role");
        Ok(())
    }

    #[instrument(name = "authz.list_role_permissions", skip(self), err)]
    pub async fn list_role_permissions(
        &self,
        filter: RolePermissionFilter,
        page: PageRequest,
    ) -> Result<Page<RolePermission>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .list_role_permissions(&mut tx, &filter, page)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    async fn create_role_permission_in_tx(
        &self,
        tx: &mut R::Tx,
        input: &NewRolePermission,
    ) -> Result<(RolePermission, BTreeSet<i64>)> {
        if self.repo.get_role_by_id(tx, input.role_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Role {} not found", input.role_id)));
        }
        if self
            .repo
            .get_permission_by_id(tx, input.permission_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "Permission {} not found",
                input.permission_id
            )));
        }
        if self
            .repo
            .get_role_permission(tx, input.role_id, input.permission_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Role {} already has permission {}",
                input.role_id, input.permission_id
            )));
        }

        let affected = self.users_for_role(tx, input.role_id, Utc::now()).await?;
        let grant = self.repo.create_role_permission(tx, input).await?;
        Ok((grant, affected))
    }

    async fn update_role_permission_in_tx(
        &self,
        tx: &mut R::Tx,
        id: i64,
        update: RolePermissionUpdate,
    ) -> Result<(RolePermission, BTreeSet<i64>)> {
        let mut grant = self
            .repo
            .get_role_permission_by_id(tx, id)
            .await?
            .ok_or_else(|| grant_not_found(id))?;
        let affected = self.users_for_role(tx, grant.role_id, Utc::now()).await?;

        if let Some(granted) = update.granted {
            grant.granted = granted;
        }
        grant.conditions = update.conditions.apply(grant.conditions);

        let updated = self
            .repo
            .update_role_permission(tx, &grant)
            .await?
            .ok_or_else(|| grant_not_found(id))?;
        Ok((updated, affected))
    }

    async fn delete_role_permission_in_tx(&self, tx: &mut R::Tx, id: i64) -> Result<BTreeSet<i64>> {
        let grant = self
            .repo
            .get_role_permission_by_id(tx, id)
            .await?
            .ok_or_else(|| grant_not_found(id))?;
        let affected = self.users_for_role(tx, grant.role_id, Utc::now()).await?;
        self.repo.delete_role_permission(tx, id).await?;
        Ok(affected)
    }

    async fn revoke_permission_in_tx(
        &self,
        tx: &mut R::Tx,
        role_id: i64,
        permission_id: i64,
    ) -> Result<BTreeSet<i64>> {
        let grant = self
            .repo
            .get_role_permission(tx, role_id, permission_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Role {} does not have permission {}",
                    role_id, permission_id
                ))
            })?;
        let affected = self.users_for_role(tx, role_id, Utc::now()).await?;
        self.repo.delete_role_permission(tx, grant.id).await?;
        Ok(affected)
    }
}
