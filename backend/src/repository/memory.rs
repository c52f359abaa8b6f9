//! In-process implementation of [`AuthzRepository`].
//!
//! Transactions are serialized: `begin` takes the store lock and hands out a
//! working copy that `commit` writes back. Constraints mirror the SQL schema.
//! A task must not open a second transaction while holding one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{constraints, AuthzRepository, RepoResult, RepositoryError};
use crate::models::{
    NewPermission, NewRole, NewRolePermission, NewUserRole, Page, PageRequest, Permission,
    PermissionFilter, Role, RoleFilter, RolePermission, RolePermissionFilter, UserRole,
    UserRoleStatus,
};

#[derive(Debug, Clone, Default)]
struct Sequences {
    roles: i64,
    permissions: i64,
    role_permissions: i64,
    user_roles: i64,
}

impl Sequences {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// Snapshot of every table.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub roles: BTreeMap<i64, Role>,
    pub permissions: BTreeMap<i64, Permission>,
    pub role_permissions: BTreeMap<i64, RolePermission>,
    pub user_roles: BTreeMap<i64, UserRole>,
    seq: Sequences,
}

impl MemoryState {
    fn check_role(&self, role: &Role) -> RepoResult<()> {
        let taken = self
            .roles
            .values()
            .any(|r| r.id != role.id && r.slug.eq_ignore_ascii_case(&role.slug));
        conflict_if(taken, constraints::ROLE_SLUG)
    }

    fn check_permission(&self, permission: &Permission) -> RepoResult<()> {
        let others = || self.permissions.values().filter(|p| p.id != permission.id);
        conflict_if(
            others().any(|p| p.name == permission.name),
            constraints::PERMISSION_NAME,
        )?;
        conflict_if(
            others().any(|p| p.resource == permission.resource && p.action == permission.action),
            constraints::PERMISSION_RESOURCE_ACTION,
        )
    }

    fn check_role_permission(&self, grant: &RolePermission) -> RepoResult<()> {
        if !self.roles.contains_key(&grant.role_id)
            || !self.permissions.contains_key(&grant.permission_id)
        {
            return Err(RepositoryError::Infrastructure(
                "role_permissions foreign key violated".into(),
            ));
        }
        conflict_if(
            self.role_permissions.values().any(|rp| {
                rp.id != grant.id
                    && rp.role_id == grant.role_id
                    && rp.permission_id == grant.permission_id
            }),
            constraints::ROLE_PERMISSION_PAIR,
        )
    }

    fn check_user_role(&self, assignment: &UserRole) -> RepoResult<()> {
        if !self.roles.contains_key(&assignment.role_id) {
            return Err(RepositoryError::Infrastructure(
                "user_roles foreign key violated".into(),
            ));
        }
        let others = || {
            self.user_roles
                .values()
                .filter(|ur| ur.id != assignment.id && ur.user_id == assignment.user_id)
        };
        conflict_if(
            others().any(|ur| ur.role_id == assignment.role_id),
            constraints::USER_ROLE_PAIR,
        )?;
        conflict_if(
            assignment.is_active && others().any(|ur| ur.is_active),
            constraints::USER_ROLE_ONE_ACTIVE,
        )
    }

    fn active_row_mut(&mut self, user_id: i64, now: DateTime<Utc>) -> Option<&mut UserRole> {
        self.user_roles
            .values_mut()
            .find(|ur| ur.user_id == user_id && ur.is_current(now))
    }

    fn granted_for_role(&self, role_id: i64) -> Vec<Permission> {
        self.role_permissions
            .values()
            .filter(|rp| rp.role_id == role_id && rp.granted)
            .filter_map(|rp| {
                let permission = self.permissions.get(&rp.permission_id)?;
                if !permission.is_active {
                    return None;
                }
                let mut effective = permission.clone();
                if rp.conditions.is_some() {
                    effective.conditions = rp.conditions.clone();
                }
                Some((effective.id, effective))
            })
            .collect::<BTreeMap<i64, Permission>>()
            .into_values()
            .collect()
    }
}

fn conflict_if(taken: bool, constraint: &str) -> RepoResult<()> {
    if taken {
        Err(RepositoryError::Conflict {
            constraint: constraint.to_string(),
        })
    } else {
        Ok(())
    }
}

fn paginate<T: Clone>(rows: Vec<&T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .cloned()
        .collect();
    Page {
        items,
        total,
        page: page.page,
        limit: page.limit,
    }
}

/// Open transaction over the in-memory store.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    read_only: bool,
}

impl MemoryTx {
    fn writable(&mut self) -> RepoResult<&mut MemoryState> {
        if self.read_only {
            return Err(RepositoryError::Infrastructure(
                "cannot execute write in a read-only transaction".into(),
            ));
        }
        Ok(&mut self.work)
    }
}

/// Authorization repository held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryAuthzRepository {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryAuthzRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail (and roll back) until reset.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Insert a role with a fixed id.
    pub async fn seed_role(&self, id: i64, role: NewRole) -> Role {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = Role {
            id,
            name: role.name,
            slug: role.slug.to_ascii_lowercase(),
            description: role.description,
            is_system_role: role.is_system_role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.seq.roles = state.seq.roles.max(id);
        state.roles.insert(id, row.clone());
        row
    }

    /// Insert a permission with a fixed id.
    pub async fn seed_permission(&self, id: i64, permission: NewPermission) -> Permission {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = Permission {
            id,
            name: permission.name,
            resource: permission.resource,
            action: permission.action,
            description: permission.description,
            conditions: permission.conditions,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.seq.permissions = state.seq.permissions.max(id);
        state.permissions.insert(id, row.clone());
        row
    }

    /// Insert a grant with a fixed id.
    pub async fn seed_role_permission(&self, id: i64, grant: NewRolePermission) -> RolePermission {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = RolePermission {
            id,
            role_id: grant.role_id,
            permission_id: grant.permission_id,
            granted: grant.granted,
            conditions: grant.conditions,
            created_at: now,
            updated_at: now,
        };
        state.seq.role_permissions = state.seq.role_permissions.max(id);
        state.role_permissions.insert(id, row.clone());
        row
    }

    /// Insert an assignment with a fixed id.
    pub async fn seed_user_role(&self, id: i64, assignment: NewUserRole) -> UserRole {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = UserRole {
            id,
            user_id: assignment.user_id,
            role_id: assignment.role_id,
            is_active: assignment.is_active,
            status: assignment.status,
            expires_at: assignment.expires_at,
            blocked_until: None,
            block_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.seq.user_roles = state.seq.user_roles.max(id);
        state.user_roles.insert(id, row.clone());
        row
    }
}

#[async_trait]
impl AuthzRepository for MemoryAuthzRepository {
    type Tx = MemoryTx;

    async fn begin(&self) -> RepoResult<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx {
            guard,
            work,
            read_only: false,
        })
    }

    async fn begin_read_only(&self) -> RepoResult<Self::Tx> {
        let mut tx = self.begin().await?;
        tx.read_only = true;
        Ok(tx)
    }

    async fn commit(&self, mut tx: Self::Tx) -> RepoResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Infrastructure("commit failed".into()));
        }
        *tx.guard = tx.work;
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> RepoResult<()> {
        Ok(())
    }

    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }

    // Roles

    async fn create_role(&self, tx: &mut Self::Tx, role: &NewRole) -> RepoResult<Role> {
        let state = tx.writable()?;
        let now = Utc::now();
        let mut row = Role {
            id: 0,
            name: role.name.clone(),
            slug: role.slug.to_ascii_lowercase(),
            description: role.description.clone(),
            is_system_role: role.is_system_role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.check_role(&row)?;
        row.id = Sequences::next(&mut state.seq.roles);
        state.roles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_role_by_id(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<Option<Role>> {
        Ok(tx.work.roles.get(&id).cloned())
    }

    async fn get_role_by_slug(&self, tx: &mut Self::Tx, slug: &str) -> RepoResult<Option<Role>> {
        Ok(tx
            .work
            .roles
            .values()
            .find(|r| r.slug.eq_ignore_ascii_case(slug))
            .cloned())
    }

    async fn update_role(&self, tx: &mut Self::Tx, role: &Role) -> RepoResult<Option<Role>> {
        let state = tx.writable()?;
        let Some(row) = state.roles.get_mut(&role.id) else {
            return Ok(None);
        };
        row.name = role.name.clone();
        row.description = role.description.clone();
        row.is_active = role.is_active;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_role(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let state = tx.writable()?;
        if state.roles.remove(&id).is_none() {
            return Ok(false);
        }
        state.role_permissions.retain(|_, rp| rp.role_id != id);
        state.user_roles.retain(|_, ur| ur.role_id != id);
        Ok(true)
    }

    async fn list_roles(
        &self,
        tx: &mut Self::Tx,
        filter: &RoleFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Role>> {
        let rows = tx.work.roles.values().filter(|r| filter.matches(r)).collect();
        Ok(paginate(rows, page))
    }

    // Permissions

    async fn create_permission(
        &self,
        tx: &mut Self::Tx,
        permission: &NewPermission,
    ) -> RepoResult<Permission> {
        let state = tx.writable()?;
        let now = Utc::now();
        let mut row = Permission {
            id: 0,
            name: permission.name.clone(),
            resource: permission.resource.clone(),
            action: permission.action.clone(),
            description: permission.description.clone(),
            conditions: permission.conditions.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.check_permission(&row)?;
        row.id = Sequences::next(&mut state.seq.permissions);
        state.permissions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_permission_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<Permission>> {
        Ok(tx.work.permissions.get(&id).cloned())
    }

    async fn get_permission_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> RepoResult<Option<Permission>> {
        Ok(tx
            .work
            .permissions
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn get_permission_by_resource_action(
        &self,
        tx: &mut Self::Tx,
        resource: &str,
        action: &str,
    ) -> RepoResult<Option<Permission>> {
        Ok(tx
            .work
            .permissions
            .values()
            .find(|p| p.resource == resource && p.action == action)
            .cloned())
    }

    async fn get_permissions_by_action(
        &self,
        tx: &mut Self::Tx,
        action: &str,
    ) -> RepoResult<Vec<Permission>> {
        Ok(tx
            .work
            .permissions
            .values()
            .filter(|p| p.action == action)
            .cloned()
            .collect())
    }

    async fn update_permission(
        &self,
        tx: &mut Self::Tx,
        permission: &Permission,
    ) -> RepoResult<Option<Permission>> {
        let state = tx.writable()?;
        let Some(current) = state.permissions.get(&permission.id) else {
            return Ok(None);
        };
        let mut row = current.clone();
        row.name = permission.name.clone();
        row.description = permission.description.clone();
        row.is_active = permission.is_active;
        row.conditions = permission.conditions.clone();
        row.updated_at = Utc::now();
        state.check_permission(&row)?;
        state.permissions.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn delete_permission(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let state = tx.writable()?;
        if state.permissions.remove(&id).is_none() {
            return Ok(false);
        }
        state.role_permissions.retain(|_, rp| rp.permission_id != id);
        Ok(true)
    }

    async fn list_permissions(
        &self,
        tx: &mut Self::Tx,
        filter: &PermissionFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Permission>> {
        let rows = tx
            .work
            .permissions
            .values()
            .filter(|p| filter.matches(p))
            .collect();
        Ok(paginate(rows, page))
    }

    // Role-permission grants

    async fn create_role_permission(
        &self,
        tx: &mut Self::Tx,
        grant: &NewRolePermission,
    ) -> RepoResult<RolePermission> {
        let state = tx.writable()?;
        let now = Utc::now();
        let mut row = RolePermission {
            id: 0,
            role_id: grant.role_id,
            permission_id: grant.permission_id,
            granted: grant.granted,
            conditions: grant.conditions.clone(),
            created_at: now,
            updated_at: now,
        };
        state.check_role_permission(&row)?;
        row.id = Sequences::next(&mut state.seq.role_permissions);
        state.role_permissions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_role_permission_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<RolePermission>> {
        Ok(tx.work.role_permissions.get(&id).cloned())
    }

    async fn get_role_permission(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
        permission_id: i64,
    ) -> RepoResult<Option<RolePermission>> {
        Ok(tx
            .work
            .role_permissions
            .values()
            .find(|rp| rp.role_id == role_id && rp.permission_id == permission_id)
            .cloned())
    }

    async fn update_role_permission(
        &self,
        tx: &mut Self::Tx,
        grant: &RolePermission,
    ) -> RepoResult<Option<RolePermission>> {
        let state = tx.writable()?;
        let Some(row) = state.role_permissions.get_mut(&grant.id) else {
            return Ok(None);
        };
        row.granted = grant.granted;
        row.conditions = grant.conditions.clone();
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_role_permission(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let state = tx.writable()?;
        Ok(state.role_permissions.remove(&id).is_some())
    }

    async fn list_role_permissions(
        &self,
        tx: &mut Self::Tx,
        filter: &RolePermissionFilter,
        page: PageRequest,
    ) -> RepoResult<Page<RolePermission>> {
        let rows = tx
            .work
            .role_permissions
            .values()
            .filter(|rp| filter.matches(rp))
            .collect();
        Ok(paginate(rows, page))
    }

    async fn granted_permissions_for_role(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
    ) -> RepoResult<Vec<Permission>> {
        Ok(tx.work.granted_for_role(role_id))
    }

    // User-role assignments

    async fn create_user_role(
        &self,
        tx: &mut Self::Tx,
        assignment: &NewUserRole,
    ) -> RepoResult<UserRole> {
        let state = tx.writable()?;
        let now = Utc::now();
        let mut row = UserRole {
            id: 0,
            user_id: assignment.user_id,
            role_id: assignment.role_id,
            is_active: assignment.is_active,
            status: assignment.status,
            expires_at: assignment.expires_at,
            blocked_until: None,
            block_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.check_user_role(&row)?;
        row.id = Sequences::next(&mut state.seq.user_roles);
        state.user_roles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_user_role_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<UserRole>> {
        Ok(tx.work.user_roles.get(&id).cloned())
    }

    async fn get_user_role(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        role_id: i64,
    ) -> RepoResult<Option<UserRole>> {
        Ok(tx
            .work
            .user_roles
            .values()
            .find(|ur| ur.user_id == user_id && ur.role_id == role_id)
            .cloned())
    }

    async fn update_user_role(
        &self,
        tx: &mut Self::Tx,
        assignment: &UserRole,
    ) -> RepoResult<Option<UserRole>> {
        let state = tx.writable()?;
        let Some(current) = state.user_roles.get(&assignment.id) else {
            return Ok(None);
        };
        let mut row = current.clone();
        row.is_active = assignment.is_active;
        row.status = assignment.status;
        row.expires_at = assignment.expires_at;
        row.updated_at = Utc::now();
        state.check_user_role(&row)?;
        state.user_roles.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn delete_user_role(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let state = tx.writable()?;
        Ok(state.user_roles.remove(&id).is_some())
    }

    async fn list_user_roles_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
    ) -> RepoResult<Vec<UserRole>> {
        Ok(tx
            .work
            .user_roles
            .values()
            .filter(|ur| ur.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn active_user_role_for(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        Ok(tx
            .work
            .user_roles
            .values()
            .find(|ur| ur.user_id == user_id && ur.is_current(now))
            .cloned())
    }

    async fn effective_permissions_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Permission>> {
        let state = &tx.work;
        let mut permissions: Vec<Permission> = state
            .user_roles
            .values()
            .filter(|ur| ur.user_id == user_id && ur.is_current(now))
            .filter(|ur| state.roles.get(&ur.role_id).is_some_and(|r| r.is_active))
            .flat_map(|ur| state.granted_for_role(ur.role_id))
            .collect();
        permissions.sort_by_key(|p| p.id);
        Ok(permissions)
    }

    // Invalidation fan-out

    async fn active_user_ids_for_role(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<i64>> {
        let mut users: Vec<i64> = tx
            .work
            .user_roles
            .values()
            .filter(|ur| ur.role_id == role_id && ur.is_current(now))
            .map(|ur| ur.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();
        Ok(users)
    }

    async fn role_ids_for_permission(
        &self,
        tx: &mut Self::Tx,
        permission_id: i64,
    ) -> RepoResult<Vec<i64>> {
        let mut roles: Vec<i64> = tx
            .work
            .role_permissions
            .values()
            .filter(|rp| rp.permission_id == permission_id)
            .map(|rp| rp.role_id)
            .collect();
        roles.sort_unstable();
        Ok(roles)
    }

    // Temp-block lifecycle

    async fn block_user_temporarily(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        until: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        let state = tx.writable()?;
        let Some(row) = state.active_row_mut(user_id, now) else {
            return Ok(None);
        };
        if !matches!(
            row.status,
            UserRoleStatus::Active | UserRoleStatus::TempBlocked
        ) {
            return Ok(None);
        }
        row.status = UserRoleStatus::TempBlocked;
        row.blocked_until = Some(until);
        row.block_reason = Some(reason.to_string());
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn unblock_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        let state = tx.writable()?;
        let row = state.user_roles.values_mut().find(|ur| {
            ur.user_id == user_id && ur.is_active && ur.status == UserRoleStatus::TempBlocked
        });
        let Some(row) = row else {
            return Ok(None);
        };
        row.status = UserRoleStatus::Active;
        row.blocked_until = None;
        row.block_reason = None;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn unblock_expired_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        let state = tx.writable()?;
        let row = state.user_roles.values_mut().find(|ur| {
            ur.user_id == user_id
                && ur.is_active
                && ur.status == UserRoleStatus::TempBlocked
                && ur.blocked_until.is_some_and(|until| until <= now)
        });
        let Some(row) = row else {
            return Ok(None);
        };
        row.status = UserRoleStatus::Active;
        row.blocked_until = None;
        row.block_reason = None;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn expired_temp_blocked_user_roles(
        &self,
        tx: &mut Self::Tx,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<UserRole>> {
        let mut rows: Vec<UserRole> = tx
            .work
            .user_roles
            .values()
            .filter(|ur| {
                ur.is_active
                    && ur.status == UserRoleStatus::TempBlocked
                    && ur.blocked_until.is_some_and(|until| until <= now)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|ur| ur.blocked_until);
        Ok(rows)
    }

    // Active role switching

    async fn deactivate_all_user_roles(&self, tx: &mut Self::Tx, user_id: i64) -> RepoResult<u64> {
        let state = tx.writable()?;
        let now = Utc::now();
        let mut touched = 0;
        for row in state.user_roles.values_mut().filter(|ur| ur.user_id == user_id) {
            row.is_active = false;
            row.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn activate_user_role(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        role_id: i64,
    ) -> RepoResult<Option<UserRole>> {
        let state = tx.writable()?;
        let Some(current) = state
            .user_roles
            .values()
            .find(|ur| ur.user_id == user_id && ur.role_id == role_id)
        else {
            return Ok(None);
        };
        let mut row = current.clone();
        row.is_active = true;
        row.updated_at = Utc::now();
        state.check_user_role(&row)?;
        state.user_roles.insert(row.id, row.clone());
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn new_role(slug: &str) -> NewRole {
        NewRole {
            name: slug.to_uppercase(),
            slug: slug.into(),
            description: None,
            is_system_role: false,
        }
    }

    fn new_permission(name: &str, resource: &str, action: &str) -> NewPermission {
        NewPermission {
            name: name.into(),
            resource: resource.into(),
            action: action.into(),
            description: None,
            conditions: None,
        }
    }

    fn assignment(user_id: i64, role_id: i64, is_active: bool) -> NewUserRole {
        NewUserRole {
            user_id,
            role_id,
            is_active,
            status: UserRoleStatus::Active,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let repo = MemoryAuthzRepository::new();
        let mut tx = repo.begin().await.unwrap();
        repo.create_role(&mut tx, &new_role("owner")).await.unwrap();
        repo.rollback(tx).await.unwrap();

        assert!(repo.snapshot().await.roles.is_empty());
    }

    #[tokio::test]
    async fn test_commit_persists_writes() {
        let repo = MemoryAuthzRepository::new();
        let mut tx = repo.begin().await.unwrap();
        let role = repo.create_role(&mut tx, &new_role("Owner")).await.unwrap();
        repo.commit(tx).await.unwrap();

        assert_eq!(role.slug, "owner");
        let mut tx = repo.begin_read_only().await.unwrap();
        let found = repo.get_role_by_slug(&mut tx, "OWNER").await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(role.id));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_old_state() {
        let repo = MemoryAuthzRepository::new();
        repo.set_fail_commits(true);
        let mut tx = repo.begin().await.unwrap();
        repo.create_role(&mut tx, &new_role("owner")).await.unwrap();
        assert!(repo.commit(tx).await.is_err());
        assert!(repo.snapshot().await.roles.is_empty());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let repo = MemoryAuthzRepository::new();
        let mut tx = repo.begin_read_only().await.unwrap();
        let err = repo.create_role(&mut tx, &new_role("owner")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn test_unique_constraints_surface_as_conflicts() {
        let repo = MemoryAuthzRepository::new();
        let mut tx = repo.begin().await.unwrap();
        repo.create_role(&mut tx, &new_role("owner")).await.unwrap();
        let err = repo.create_role(&mut tx, &new_role("OWNER")).await.unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Conflict {
                constraint: constraints::ROLE_SLUG.into()
            }
        );

        repo.create_permission(&mut tx, &new_permission("a", "listing", "approve"))
            .await
            .unwrap();
        let err = repo
            .create_permission(&mut tx, &new_permission("b", "listing", "approve"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Conflict {
                constraint: constraints::PERMISSION_RESOURCE_ACTION.into()
            }
        );
    }

    #[tokio::test]
    async fn test_single_active_assignment_enforced() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(1, new_role("owner")).await;
        repo.seed_role(2, new_role("realtor")).await;

        let mut tx = repo.begin().await.unwrap();
        repo.create_user_role(&mut tx, &assignment(7, 1, true))
            .await
            .unwrap();
        let err = repo
            .create_user_role(&mut tx, &assignment(7, 2, true))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Conflict {
                constraint: constraints::USER_ROLE_ONE_ACTIVE.into()
            }
        );

        repo.create_user_role(&mut tx, &assignment(7, 2, false))
            .await
            .unwrap();
        repo.deactivate_all_user_roles(&mut tx, 7).await.unwrap();
        repo.activate_user_role(&mut tx, 7, 2).await.unwrap();
        let active = repo
            .active_user_role_for(&mut tx, 7, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.role_id, 2);
    }

    #[tokio::test]
    async fn test_effective_permissions_apply_grant_overrides() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        repo.seed_permission(100, new_permission("create", "listing", "POST:/listings"))
            .await;
        repo.seed_permission(101, new_permission("delete", "listing", "DELETE:/listings/:id"))
            .await;
        repo.seed_permission(102, new_permission("approve", "listing", "approve"))
            .await;
        repo.seed_role_permission(
            1,
            NewRolePermission {
                role_id: 10,
                permission_id: 100,
                granted: true,
                conditions: None,
            },
        )
        .await;
        repo.seed_role_permission(
            2,
            NewRolePermission {
                role_id: 10,
                permission_id: 101,
                granted: true,
                conditions: Some(json!({"owner": "self"})),
            },
        )
        .await;
        repo.seed_role_permission(
            3,
            NewRolePermission {
                role_id: 10,
                permission_id: 102,
                granted: false,
                conditions: None,
            },
        )
        .await;
        repo.seed_user_role(1, assignment(42, 10, true)).await;

        let mut tx = repo.begin_read_only().await.unwrap();
        let effective = repo
            .effective_permissions_for_user(&mut tx, 42, Utc::now())
            .await
            .unwrap();
        let ids: Vec<i64> = effective.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![100, 101]);
        assert_eq!(effective[1].conditions, Some(json!({"owner": "self"})));
    }

    #[tokio::test]
    async fn test_expired_assignment_has_no_permissions() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        repo.seed_permission(100, new_permission("create", "listing", "POST:/listings"))
            .await;
        repo.seed_role_permission(
            1,
            NewRolePermission {
                role_id: 10,
                permission_id: 100,
                granted: true,
                conditions: None,
            },
        )
        .await;
        let now = Utc::now();
        let mut expired = assignment(42, 10, true);
        expired.expires_at = Some(now - Duration::minutes(1));
        repo.seed_user_role(1, expired).await;

        let mut tx = repo.begin_read_only().await.unwrap();
        assert!(repo
            .effective_permissions_for_user(&mut tx, 42, now)
            .await
            .unwrap()
            .is_empty());
        assert!(repo
            .active_user_ids_for_role(&mut tx, 10, now)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_block_and_unblock_compare_and_set() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        repo.seed_user_role(1, assignment(7, 10, true)).await;
        let now = Utc::now();
        let until = now + Duration::minutes(15);

        let mut tx = repo.begin().await.unwrap();
        let blocked = repo
            .block_user_temporarily(&mut tx, 7, until, "too many attempts", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blocked.status, UserRoleStatus::TempBlocked);
        assert_eq!(blocked.blocked_until, Some(until));

        assert!(repo
            .expired_temp_blocked_user_roles(&mut tx, now)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.expired_temp_blocked_user_roles(&mut tx, until)
                .await
                .unwrap()
                .len(),
            1
        );

        let unblocked = repo.unblock_user(&mut tx, 7, now).await.unwrap().unwrap();
        assert_eq!(unblocked.status, UserRoleStatus::Active);
        assert_eq!(unblocked.blocked_until, None);
        assert!(repo.unblock_user(&mut tx, 7, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unblock_expired_respects_renewed_deadline() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        repo.seed_user_role(1, assignment(7, 10, true)).await;
        let now = Utc::now();

        let mut tx = repo.begin().await.unwrap();
        repo.block_user_temporarily(&mut tx, 7, now + Duration::minutes(15), "renewed", now)
            .await
            .unwrap()
            .unwrap();
        assert!(repo.unblock_expired_user(&mut tx, 7, now).await.unwrap().is_none());
        let row = repo.get_user_role(&mut tx, 7, 10).await.unwrap().unwrap();
        assert_eq!(row.status, UserRoleStatus::TempBlocked);
        assert_eq!(row.block_reason.as_deref(), Some("renewed"));

        let lifted = repo
            .unblock_expired_user(&mut tx, 7, now + Duration::minutes(15))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lifted.status, UserRoleStatus::Active);
        assert_eq!(lifted.blocked_until, None);
    }

    #[tokio::test]
    async fn test_block_skips_pending_rows() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        let mut pending = assignment(7, 10, true);
        pending.status = UserRoleStatus::PendingEmail;
        repo.seed_user_role(1, pending).await;

        let now = Utc::now();
        let mut tx = repo.begin().await.unwrap();
        let result = repo
            .block_user_temporarily(&mut tx, 7, now + Duration::minutes(15), "x", now)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        repo.seed_permission(100, new_permission("create", "listing", "POST:/listings"))
            .await;
        repo.seed_role_permission(
            1,
            NewRolePermission {
                role_id: 10,
                permission_id: 100,
                granted: true,
                conditions: None,
            },
        )
        .await;
        repo.seed_user_role(1, assignment(42, 10, true)).await;

        let mut tx = repo.begin().await.unwrap();
        assert!(repo.delete_permission(&mut tx, 100).await.unwrap());
        assert!(tx.work.role_permissions.is_empty());
        assert!(repo.delete_role(&mut tx, 10).await.unwrap());
        assert!(tx.work.user_roles.is_empty());
        assert!(!repo.delete_role(&mut tx, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_roles_paginates_filtered_rows() {
        let repo = MemoryAuthzRepository::new();
        for (id, slug) in [(1, "admin"), (2, "owner"), (3, "realtor"), (4, "realtor_pj")] {
            repo.seed_role(id, new_role(slug)).await;
        }
        let mut tx = repo.begin_read_only().await.unwrap();
        let filter = RoleFilter {
            slug: Some(crate::models::LikePattern::contains("realtor")),
            ..Default::default()
        };
        let page = repo
            .list_roles(&mut tx, &filter, PageRequest::new(Some(2), Some(1)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].slug, "realtor_pj");
    }

    #[tokio::test]
    async fn test_seeded_ids_advance_sequences() {
        let repo = MemoryAuthzRepository::new();
        repo.seed_role(10, new_role("owner")).await;
        let mut tx = repo.begin().await.unwrap();
        let created = repo.create_role(&mut tx, &new_role("realtor")).await.unwrap();
        assert_eq!(created.id, 11);
    }
}
