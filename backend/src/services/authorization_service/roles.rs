//! Role management.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, instrument};

use super::AuthorizationService;
use crate::error::{codes, AppError, Result};
use crate::models::role::{is_valid_slug, normalize_slug};
use crate::models::{NewRole, Page, PageRequest, Role, RoleFilter, RoleUpdate};
use crate::repository::AuthzRepository;

impl<R: AuthzRepository> AuthorizationService<R> {
    /// Create a role. The slug is lower-cased and must be unused.
    #[instrument(name = "authz.create_role", skip(self), fields(slug = %input.slug), err)]
    pub async fn create_role(&self, input: NewRole) -> Result<Role> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid_field("name", "must not be empty"));
        }
        let slug = normalize_slug(&input.slug);
        if !is_valid_slug(&slug) {
            return Err(AppError::invalid_field(
                "slug",
                "must match ^[a-z0-9][a-z0-9_-]{1,63}$",
            ));
        }

        let mut tx = self.repo.begin_read_only().await?;
        let existing = self
            .repo
            .get_role_by_slug(&mut tx, &slug)
            .await
            .map_err(Into::into);
        if self.finish(tx, existing).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Role with slug '{}' already exists",
                slug
            )));
        }

        // A concurrent insert of the same slug still surfaces as a conflict.
        let new_role = NewRole {
            name,
            slug,
            description: input
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            is_system_role: input.is_system_role,
        };
        let mut tx = self.repo.begin().await?;
        let created = self
            .repo
            .create_role(&mut tx, &new_role)
            .await
            .map_err(Into::into);
        let role = self.finish(tx, created).await?;
        info!(role_id = role.id, slug = %role.slug, "Role created");
        Ok(role)
    }

    #[instrument(name = "authz.get_role", skip(self), err)]
    pub async fn get_role(&self, role_id: i64) -> Result<Role> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .get_role_by_id(&mut tx, role_id)
            .await
            .map_err(Into::into);
        self.finish(tx, result)
            .await?
            .ok_or_else(|| role_not_found(role_id))
    }

    /// Update name, description and the active flag. Slug and the system
    /// flag never change.
    #[instrument(name = "authz.update_role", skip(self, update), err)]
    pub async fn update_role(&self, role_id: i64, update: RoleUpdate) -> Result<Role> {
        let name = update.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid_field("name", "must not be empty"));
        }

        let mut tx = self.repo.begin().await?;
        let result = self
            .update_role_in_tx(&mut tx, role_id, name, update)
            .await;
        let (role, affected) = self.finish(tx, result).await?;
        self.invalidate_users(affected, "update_role").await;
        Ok(role)
    }

    /// Logically delete a role by deactivating it.
    ///
    /// Refused for the admin role, system roles and roles still held as an
    /// active assignment.
    #[instrument(name = "authz.delete_role", skip(self), err)]
    pub async fn delete_role(&self, role_id: i64) -> Result<Role> {
        let mut tx = self.repo.begin().await?;
        let result = self.delete_role_in_tx(&mut tx, role_id).await;
        let role = self.finish(tx, result).await?;
        info!(role_id, slug = %role.slug, "Role deactivated");
        Ok(role)
    }

    #[instrument(name = "authz.list_roles", skip(self), err)]
    pub async fn list_roles(&self, filter: RoleFilter, page: PageRequest) -> Result<Page<Role>> {
        let mut tx = self.repo.begin_read_only().await?;
        let result = self
            .repo
            .list_roles(&mut tx, &filter, page)
            .await
            .map_err(Into::into);
        self.finish(tx, result).await
    }

    async fn update_role_in_tx(
        &self,
        tx: &mut R::Tx,
        role_id: i64,
        name: String,
        update: RoleUpdate,
    ) -> Result<(Role, BTreeSet<i64>)> {
        let mut role = self
            .repo
            .get_role_by_id(tx, role_id)
            .await?
            .ok_or_else(|| role_not_found(role_id))?;
        let affected = self.users_for_role(tx, role_id, Utc::now()).await?;

        role.name = name;
        role.description = update
            .description
            .map(|d| d.trim().to_string())
            .apply(role.description);
        if let Some(is_active) = update.is_active {
            role.is_active = is_active;
        }
        let updated = self
            .repo
            .update_role(tx, &role)
            .await?
            .ok_or_else(|| role_not_found(role_id))?;
        Ok((updated, affected))
    }

    async fn delete_role_in_tx(&self, tx: &mut R::Tx, role_id: i64) -> Result<Role> {
        let mut role = self
            .repo
            .get_role_by_id(tx, role_id)
            .await?
            .ok_or_else(|| role_not_found(role_id))?;

        if role.slug.eq_ignore_ascii_case(&self.settings.admin_role_slug) {
            return Err(AppError::precondition(
                codes::ADMIN_ROLE_PROTECTED,
                "The admin role cannot be deleted",
            ));
        }
        if role.is_system_role {
            return Err(AppError::precondition(
                codes::SYSTEM_ROLE_PROTECTED,
                "System roles cannot be deleted",
            ));
        }
        let holders = self.users_for_role(tx, role_id, Utc::now()).await?;
        if !holders.is_empty() {
            return Err(AppError::precondition(
                codes::ROLE_IN_USE,
                format!("Role is the active role of {} user(s)", holders.len()),
            ));
        }

        role.is_active = false;
        self.repo
            .update_role(tx, &role)
            .await?
            .ok_or_else(|| role_not_found(role_id))
    }
}

fn role_not_found(role_id: i64) -> AppError {
    AppError::NotFound(format!("Role {} not found", role_id))
}
