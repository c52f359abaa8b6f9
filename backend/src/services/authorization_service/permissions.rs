//! Permission management.

use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument};

use super::AuthorizationService;
use crate::error::{AppError, Result};
use crate::models::{
    ConditionSet, HttpAction, NewPermission, Page, PageRequest, Permission, PermissionFilter,
    PermissionUpdate,
};
use crate::repository::AuthzRepository;

/// Reject condition maps outside the closed schema.
pub(super) fn validate_conditions(conditions: Option<&Value>) -> Result<()> {
    ConditionSet::parse_opt(conditions)
        .map(|_| ())
        .map_err(|err| AppError::invalid_field("conditions", err.to_string()))
}

/// HTTP actions are stored as `METHOD:/path` with an upper-case method.
fn normalize_action(action: &str) -> String {
    let action = action.trim();
    match HttpAction::parse(action) {
        Some(http) => http.as_action(),
        None => action.to_string(),
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::invalid_field(field, "must not be empty"));
    }
    Ok(value.to_string())
}

fn permission_not_found(permission_id: i64) -> AppError {
    AppError::NotFound(format!("Permission {} not found", permission_id))
}

impl<R: AuthzRepository> AuthorizationService<R> {
    #[instrument(
        name = "authz.create_permission",
        skip(self, input),
        fields(name = %input.name, action = %input.action),
        err
    )]
    pub async fn create_permission(&self, input: NewPermission) -> Result<Permission> {
        let new_permission = NewPermission {
            name: required("name", &input.name)?,
            resource: required("resource", &input.resource)?,
            action: normalize_action(&required("action", &input.action)?),
            description: input
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            conditions: input.conditions.filter(|c| !c.is_null()),
        };
        validate_conditions(new_permission.conditions.as_ref())?;

        let mut tx = self.repo.begin_read_only().await?;
        let result = self.check_permission_unique(&mut tx, &new_permission).await;
        self.finish(tx, result).await?;

        let mut tx = self.repo.begin().await?;
        let created = self
            .repo
            .create_permission(&mut tx, &new_permission)
            .await
            .map_err(Into::into);
        let permission = self.finish(tx, created).await?;
        info!(permission_id = permission.id, "Permission created");
        Ok(permission)
    }

    #[instrument(name = "authz.get_permission", skip(self), err)]
    pub async fn get_permission(&self, permission_id: i64) -> Result<Permission> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .get_permission_by_id(&mut tx, permission_id)
            .await
            .map_err(Into::into);
        self.finish(tx, result)
            .await?
            .ok_or_else(|| permission_not_found(permission_id))
    }

    /// Update a permission and drop the cache of every user holding it.
    #[instrument(name = "authz.update_permission", skip(self, update), err)]
    pub async fn update_permission(
        &self,
        permission_id: i64,
        update: PermissionUpdate,
    ) -> Result<Permission> {
        let name = update
            .name
            .as_deref()
            .map(|n| required("name", n))
            .transpose()?;
        validate_conditions(update.conditions.as_value())?;

        let mut tx = self.repo.begin().await?;
        let result = self
            .update_permission_in_tx(&mut tx, permission_id, name, update)
            .await;
        let (permission, affected) = self.finish(tx, result).await?;
        self.invalidate_users(affected, "update_permission").await;
        Ok(permission)
    }

    /// Delete a permission and drop the cache of every user who held it.
    #[instrument(name = "authz.delete_permission", skip(self), err)]
    pub async fn delete_permission(&self, permission_id: i64) -> Result<()> {
        let mut tx = self.repo.begin().await?;
        let result = self.delete_permission_in_tx(&mut tx, permission_id).await;
        let affected = self.finish(tx, result).await?;
        self.invalidate_users(affected, "delete_permission").await;
        info!(permission_id, "Permission deleted");
        Ok(())
    }

    #[instrument(name = "authz.list_permissions", skip(self), err)]
    pub async fn list_permissions(
        &self,
        filter: PermissionFilter,
        page: PageRequest,
    ) -> Result<Page<Permission>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .list_permissions(&mut tx, &filter, page)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    async fn check_permission_unique(
        &self,
        tx: &mut R::Tx,
        permission: &NewPermission,
    ) -> Result<()> {
        if self
            .repo
            .get_permission_by_name(tx, &permission.name)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Permission '{}' already exists",
                permission.name
            )));
        }
        if self
            .repo
            .get_permission_by_resource_action(tx, &permission.resource, &permission.action)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Permission for {} {} already exists",
                permission.resource, permission.action
            )));
        }
        Ok(())
    }

    async fn update_permission_in_tx(
        &self,
        tx: &mut R::Tx,
        permission_id: i64,
        name: Option<String>,
        update: PermissionUpdate,
    ) -> Result<(Permission, BTreeSet<i64>)> {
        let mut permission = self
            .repo
            .get_permission_by_id(tx, permission_id)
            .await?
            .ok_or_else(|| permission_not_found(permission_id))?;

        if let Some(name) = name {
            if let Some(other) = self.repo.get_permission_by_name(tx, &name).await? {
                if other.id != permission_id {
                    return Err(AppError::Conflict(format!(
                        "Permission '{}' already exists",
                        name
                    )));
                }
            }
            permission.name = name;
        }

        let affected = self.users_for_permission(tx, permission_id, Utc::now()).await?;

        permission.description = update
            .description
            .map(|d| d.trim().to_string())
            .apply(permission.description);
        permission.conditions = update.conditions.apply(permission.conditions);
        if let Some(is_active) = update.is_active {
            permission.is_active = is_active;
        }

        let updated = self
            .repo
            .update_permission(tx, &permission)
            .await?
            .ok_or_else(|| permission_not_found(permission_id))?;
        Ok((updated, affected))
    }

    async fn delete_permission_in_tx(
        &self,
        tx: &mut R::Tx,
        permission_id: i64,
    ) -> Result<BTreeSet<i64>> {
        if self
            .repo
            .get_permission_by_id(tx, permission_id)
            .await?
            .is_none()
        {
            return Err(permission_not_found(permission_id));
        }
        let affected = self.users_for_permission(tx, permission_id, Utc::now()).await?;
        self.repo.delete_permission(tx, permission_id).await?;
        Ok(affected)
    }
}
