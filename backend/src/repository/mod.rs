//! Persistence contract for roles, permissions, grants and user-role assignments.
//!
//! Every operation runs inside an explicit transaction handle obtained from
//! [`AuthzRepository::begin`], so callers can compute invalidation fan-out and
//! write under the same transaction.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    NewPermission, NewRole, NewRolePermission, NewUserRole, Page, PageRequest, Permission,
    PermissionFilter, Role, RoleFilter, RolePermission, RolePermissionFilter, UserRole,
};

pub use memory::MemoryAuthzRepository;
pub use postgres::PgAuthzRepository;

/// Repository failures. Point reads signal "not found" with `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write.
    #[error("unique constraint '{constraint}' violated")]
    Conflict { constraint: String },

    #[error("{0}")]
    Infrastructure(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return RepositoryError::Conflict {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        RepositoryError::Infrastructure(err.to_string())
    }
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Constraint names shared by the schema and the in-memory store.
pub mod constraints {
    pub const ROLE_SLUG: &str = "roles_slug_key";
    pub const PERMISSION_NAME: &str = "permissions_name_key";
    pub const PERMISSION_RESOURCE_ACTION: &str = "permissions_resource_action_key";
    pub const ROLE_PERMISSION_PAIR: &str = "role_permissions_role_id_permission_id_key";
    pub const USER_ROLE_PAIR: &str = "user_roles_user_id_role_id_key";
    pub const USER_ROLE_ONE_ACTIVE: &str = "user_roles_one_active_per_user";
}

#[async_trait]
pub trait AuthzRepository: Send + Sync + 'static {
    /// Transaction handle threaded through every call.
    type Tx: Send;

    async fn begin(&self) -> RepoResult<Self::Tx>;
    async fn begin_read_only(&self) -> RepoResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> RepoResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> RepoResult<()>;

    /// Round-trip to the store; used by readiness checks.
    async fn ping(&self) -> RepoResult<()>;

    // Roles

    async fn create_role(&self, tx: &mut Self::Tx, role: &NewRole) -> RepoResult<Role>;
    async fn get_role_by_id(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<Option<Role>>;
    async fn get_role_by_slug(&self, tx: &mut Self::Tx, slug: &str) -> RepoResult<Option<Role>>;
    /// Persist name, description and `is_active`.
    async fn update_role(&self, tx: &mut Self::Tx, role: &Role) -> RepoResult<Option<Role>>;
    /// Hard delete. Grants and assignments of the role go with it.
    async fn delete_role(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool>;
    async fn list_roles(
        &self,
        tx: &mut Self::Tx,
        filter: &RoleFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Role>>;

    // Permissions

    async fn create_permission(
        &self,
        tx: &mut Self::Tx,
        permission: &NewPermission,
    ) -> RepoResult<Permission>;
    async fn get_permission_by_id(&self, tx: &mut Self::Tx, id: i64)
        -> RepoResult<Option<Permission>>;
    async fn get_permission_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> RepoResult<Option<Permission>>;
    async fn get_permission_by_resource_action(
        &self,
        tx: &mut Self::Tx,
        resource: &str,
        action: &str,
    ) -> RepoResult<Option<Permission>>;
    /// All permissions carrying `action`, across resources.
    async fn get_permissions_by_action(
        &self,
        tx: &mut Self::Tx,
        action: &str,
    ) -> RepoResult<Vec<Permission>>;
    /// Persist name, description, `is_active` and conditions.
    async fn update_permission(
        &self,
        tx: &mut Self::Tx,
        permission: &Permission,
    ) -> RepoResult<Option<Permission>>;
    async fn delete_permission(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool>;
    async fn list_permissions(
        &self,
        tx: &mut Self::Tx,
        filter: &PermissionFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Permission>>;

    // Role-permission grants

    async fn create_role_permission(
        &self,
        tx: &mut Self::Tx,
        grant: &NewRolePermission,
    ) -> RepoResult<RolePermission>;
    async fn get_role_permission_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<RolePermission>>;
    async fn get_role_permission(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
        permission_id: i64,
    ) -> RepoResult<Option<RolePermission>>;
    /// Persist `granted` and conditions.
    async fn update_role_permission(
        &self,
        tx: &mut Self::Tx,
        grant: &RolePermission,
    ) -> RepoResult<Option<RolePermission>>;
    async fn delete_role_permission(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool>;
    async fn list_role_permissions(
        &self,
        tx: &mut Self::Tx,
        filter: &RolePermissionFilter,
        page: PageRequest,
    ) -> RepoResult<Page<RolePermission>>;
    /// Active permissions granted to the role, with grant conditions overriding
    /// permission conditions.
    async fn granted_permissions_for_role(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
    ) -> RepoResult<Vec<Permission>>;

    // User-role assignments

    async fn create_user_role(&self, tx: &mut Self::Tx, assignment: &NewUserRole)
        -> RepoResult<UserRole>;
    async fn get_user_role_by_id(&self, tx: &mut Self::Tx, id: i64)
        -> RepoResult<Option<UserRole>>;
    async fn get_user_role(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        role_id: i64,
    ) -> RepoResult<Option<UserRole>>;
    /// Persist `is_active`, status and `expires_at`.
    async fn update_user_role(
        &self,
        tx: &mut Self::Tx,
        assignment: &UserRole,
    ) -> RepoResult<Option<UserRole>>;
    async fn delete_user_role(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool>;
    async fn list_user_roles_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
    ) -> RepoResult<Vec<UserRole>>;
    /// The row with `is_active` set and `expires_at` null or after `now`.
    async fn active_user_role_for(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>>;
    /// Permissions reachable from the user's active role through granted rows
    /// of an active role.
    async fn effective_permissions_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Permission>>;

    // Invalidation fan-out

    async fn active_user_ids_for_role(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<i64>>;
    async fn role_ids_for_permission(
        &self,
        tx: &mut Self::Tx,
        permission_id: i64,
    ) -> RepoResult<Vec<i64>>;

    // Temp-block lifecycle

    /// Move the user's active row from `active` (or an earlier temp block) to
    /// `temp_blocked`. `None` when the user has no such row.
    async fn block_user_temporarily(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        until: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>>;
    /// Compare-and-set `temp_blocked` back to `active`. `None` when nothing
    /// was temp-blocked.
    async fn unblock_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>>;
    /// Like [`Self::unblock_user`] but only while `blocked_until <= now`.
    async fn unblock_expired_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>>;
    async fn expired_temp_blocked_user_roles(
        &self,
        tx: &mut Self::Tx,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<UserRole>>;

    // Active role switching

    /// Clear `is_active` on every assignment of the user; returns rows touched.
    async fn deactivate_all_user_roles(&self, tx: &mut Self::Tx, user_id: i64) -> RepoResult<u64>;
    async fn activate_user_role(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        role_id: i64,
    ) -> RepoResult<Option<UserRole>>;
}
