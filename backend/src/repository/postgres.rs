//! PostgreSQL implementation of [`AuthzRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{AuthzRepository, RepoResult};
use crate::models::{
    NewPermission, NewRole, NewRolePermission, NewUserRole, Page, PageRequest, Permission,
    PermissionFilter, Role, RoleFilter, RolePermission, RolePermissionFilter, UserRole,
    UserRoleStatus,
};

const ROLE_COLUMNS: &str =
    "id, name, slug, description, is_system_role, is_active, created_at, updated_at";

const PERMISSION_COLUMNS: &str =
    "id, name, resource, action, description, conditions, is_active, created_at, updated_at";

const ROLE_PERMISSION_COLUMNS: &str =
    "id, role_id, permission_id, granted, conditions, created_at, updated_at";

const USER_ROLE_COLUMNS: &str = "id, user_id, role_id, is_active, status, expires_at, \
     blocked_until, block_reason, created_at, updated_at";

/// Permission columns as seen through a grant: the grant's conditions win.
const GRANTED_PERMISSION_COLUMNS: &str = "p.id, p.name, p.resource, p.action, p.description, \
     COALESCE(rp.conditions, p.conditions) AS conditions, p.is_active, p.created_at, p.updated_at";

/// Authorization repository backed by a Postgres pool.
#[derive(Clone)]
pub struct PgAuthzRepository {
    db: PgPool,
}

impl PgAuthzRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl AuthzRepository for PgAuthzRepository {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> RepoResult<Self::Tx> {
        Ok(self.db.begin().await?)
    }

    async fn begin_read_only(&self) -> RepoResult<Self::Tx> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> RepoResult<()> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> RepoResult<()> {
        Ok(tx.rollback().await?)
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    // Roles

    async fn create_role(&self, tx: &mut Self::Tx, role: &NewRole) -> RepoResult<Role> {
        let sql = format!(
            "INSERT INTO roles (name, slug, description, is_system_role) \
             VALUES ($1, $2, $3, $4) RETURNING {ROLE_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Role>(&sql)
            .bind(&role.name)
            .bind(&role.slug)
            .bind(&role.description)
            .bind(role.is_system_role)
            .fetch_one(&mut **tx)
            .await?;
        Ok(created)
    }

    async fn get_role_by_id(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        Ok(sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn get_role_by_slug(&self, tx: &mut Self::Tx, slug: &str) -> RepoResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE slug = LOWER($1)");
        Ok(sqlx::query_as::<_, Role>(&sql)
            .bind(slug)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn update_role(&self, tx: &mut Self::Tx, role: &Role) -> RepoResult<Option<Role>> {
        let sql = format!(
            "UPDATE roles SET name = $2, description = $3, is_active = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Role>(&sql)
            .bind(role.id)
            .bind(&role.name)
            .bind(&role.description)
            .bind(role.is_active)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn delete_role(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_roles(
        &self,
        tx: &mut Self::Tx,
        filter: &RoleFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Role>> {
        const WHERE: &str = "WHERE ($1::text IS NULL OR name ILIKE $1) \
              AND ($2::text IS NULL OR slug ILIKE $2) \
              AND ($3::text IS NULL OR description ILIKE $3) \
              AND ($4::bool IS NULL OR is_system_role = $4) \
              AND ($5::bool IS NULL OR is_active = $5) \
              AND ($6::bigint IS NULL OR id >= $6) \
              AND ($7::bigint IS NULL OR id <= $7)";

        let name = filter.name.as_ref().map(|p| p.as_str());
        let slug = filter.slug.as_ref().map(|p| p.as_str());
        let description = filter.description.as_ref().map(|p| p.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM roles {WHERE}"))
            .bind(name)
            .bind(slug)
            .bind(description)
            .bind(filter.is_system_role)
            .bind(filter.is_active)
            .bind(filter.id_from)
            .bind(filter.id_to)
            .fetch_one(&mut **tx)
            .await?;

        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles {WHERE} ORDER BY id LIMIT $8 OFFSET $9");
        let items = sqlx::query_as::<_, Role>(&sql)
            .bind(name)
            .bind(slug)
            .bind(description)
            .bind(filter.is_system_role)
            .bind(filter.is_active)
            .bind(filter.id_from)
            .bind(filter.id_to)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&mut **tx)
            .await?;

        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    // Permissions

    async fn create_permission(
        &self,
        tx: &mut Self::Tx,
        permission: &NewPermission,
    ) -> RepoResult<Permission> {
        let sql = format!(
            "INSERT INTO permissions (name, resource, action, description, conditions) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PERMISSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(&permission.name)
            .bind(&permission.resource)
            .bind(&permission.action)
            .bind(&permission.description)
            .bind(&permission.conditions)
            .fetch_one(&mut **tx)
            .await?)
    }

    async fn get_permission_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1");
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn get_permission_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> RepoResult<Option<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = $1");
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn get_permission_by_resource_action(
        &self,
        tx: &mut Self::Tx,
        resource: &str,
        action: &str,
    ) -> RepoResult<Option<Permission>> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE resource = $1 AND action = $2"
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(resource)
            .bind(action)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn get_permissions_by_action(
        &self,
        tx: &mut Self::Tx,
        action: &str,
    ) -> RepoResult<Vec<Permission>> {
        let sql =
            format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE action = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(action)
            .fetch_all(&mut **tx)
            .await?)
    }

    async fn update_permission(
        &self,
        tx: &mut Self::Tx,
        permission: &Permission,
    ) -> RepoResult<Option<Permission>> {
        let sql = format!(
            "UPDATE permissions SET name = $2, description = $3, is_active = $4, \
             conditions = $5, updated_at = NOW() WHERE id = $1 RETURNING {PERMISSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(permission.id)
            .bind(&permission.name)
            .bind(&permission.description)
            .bind(permission.is_active)
            .bind(&permission.conditions)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn delete_permission(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_permissions(
        &self,
        tx: &mut Self::Tx,
        filter: &PermissionFilter,
        page: PageRequest,
    ) -> RepoResult<Page<Permission>> {
        const WHERE: &str = "WHERE ($1::text IS NULL OR name ILIKE $1) \
              AND ($2::text IS NULL OR resource ILIKE $2) \
              AND ($3::text IS NULL OR action ILIKE $3) \
              AND ($4::bool IS NULL OR is_active = $4)";

        let name = filter.name.as_ref().map(|p| p.as_str());
        let resource = filter.resource.as_ref().map(|p| p.as_str());
        let action = filter.action.as_ref().map(|p| p.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM permissions {WHERE}"))
            .bind(name)
            .bind(resource)
            .bind(action)
            .bind(filter.is_active)
            .fetch_one(&mut **tx)
            .await?;

        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions {WHERE} ORDER BY id LIMIT $5 OFFSET $6"
        );
        let items = sqlx::query_as::<_, Permission>(&sql)
            .bind(name)
            .bind(resource)
            .bind(action)
            .bind(filter.is_active)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&mut **tx)
            .await?;

        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    // Role-permission grants

    async fn create_role_permission(
        &self,
        tx: &mut Self::Tx,
        grant: &NewRolePermission,
    ) -> RepoResult<RolePermission> {
        let sql = format!(
            "INSERT INTO role_permissions (role_id, permission_id, granted, conditions) \
             VALUES ($1, $2, $3, $4) RETURNING {ROLE_PERMISSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, RolePermission>(&sql)
            .bind(grant.role_id)
            .bind(grant.permission_id)
            .bind(grant.granted)
            .bind(&grant.conditions)
            .fetch_one(&mut **tx)
            .await?)
    }

    async fn get_role_permission_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<RolePermission>> {
        let sql = format!("SELECT {ROLE_PERMISSION_COLUMNS} FROM role_permissions WHERE id = $1");
        Ok(sqlx::query_as::<_, RolePermission>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn get_role_permission(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
        permission_id: i64,
    ) -> RepoResult<Option<RolePermission>> {
        let sql = format!(
            "SELECT {ROLE_PERMISSION_COLUMNS} FROM role_permissions \
             WHERE role_id = $1 AND permission_id = $2"
        );
        Ok(sqlx::query_as::<_, RolePermission>(&sql)
            .bind(role_id)
            .bind(permission_id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn update_role_permission(
        &self,
        tx: &mut Self::Tx,
        grant: &RolePermission,
    ) -> RepoResult<Option<RolePermission>> {
        let sql = format!(
            "UPDATE role_permissions SET granted = $2, conditions = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {ROLE_PERMISSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, RolePermission>(&sql)
            .bind(grant.id)
            .bind(grant.granted)
            .bind(&grant.conditions)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn delete_role_permission(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_role_permissions(
        &self,
        tx: &mut Self::Tx,
        filter: &RolePermissionFilter,
        page: PageRequest,
    ) -> RepoResult<Page<RolePermission>> {
        const WHERE: &str = "WHERE ($1::bigint IS NULL OR role_id = $1) \
              AND ($2::bigint IS NULL OR permission_id = $2) \
              AND ($3::bool IS NULL OR granted = $3)";

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM role_permissions {WHERE}"))
                .bind(filter.role_id)
                .bind(filter.permission_id)
                .bind(filter.granted)
                .fetch_one(&mut **tx)
                .await?;

        let sql = format!(
            "SELECT {ROLE_PERMISSION_COLUMNS} FROM role_permissions {WHERE} \
             ORDER BY id LIMIT $4 OFFSET $5"
        );
        let items = sqlx::query_as::<_, RolePermission>(&sql)
            .bind(filter.role_id)
            .bind(filter.permission_id)
            .bind(filter.granted)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&mut **tx)
            .await?;

        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn granted_permissions_for_role(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
    ) -> RepoResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {GRANTED_PERMISSION_COLUMNS} FROM role_permissions rp \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE rp.role_id = $1 AND rp.granted AND p.is_active \
             ORDER BY p.id"
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(role_id)
            .fetch_all(&mut **tx)
            .await?)
    }

    // User-role assignments

    async fn create_user_role(
        &self,
        tx: &mut Self::Tx,
        assignment: &NewUserRole,
    ) -> RepoResult<UserRole> {
        let sql = format!(
            "INSERT INTO user_roles (user_id, role_id, is_active, status, expires_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(assignment.user_id)
            .bind(assignment.role_id)
            .bind(assignment.is_active)
            .bind(assignment.status)
            .bind(assignment.expires_at)
            .fetch_one(&mut **tx)
            .await?)
    }

    async fn get_user_role_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!("SELECT {USER_ROLE_COLUMNS} FROM user_roles WHERE id = $1");
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn get_user_role(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        role_id: i64,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!(
            "SELECT {USER_ROLE_COLUMNS} FROM user_roles WHERE user_id = $1 AND role_id = $2"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .bind(role_id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn update_user_role(
        &self,
        tx: &mut Self::Tx,
        assignment: &UserRole,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!(
            "UPDATE user_roles SET is_active = $2, status = $3, expires_at = $4, \
             updated_at = NOW() WHERE id = $1 RETURNING {USER_ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(assignment.id)
            .bind(assignment.is_active)
            .bind(assignment.status)
            .bind(assignment.expires_at)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn delete_user_role(&self, tx: &mut Self::Tx, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_user_roles_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
    ) -> RepoResult<Vec<UserRole>> {
        let sql =
            format!("SELECT {USER_ROLE_COLUMNS} FROM user_roles WHERE user_id = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .fetch_all(&mut **tx)
            .await?)
    }

    async fn active_user_role_for(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!(
            "SELECT {USER_ROLE_COLUMNS} FROM user_roles \
             WHERE user_id = $1 AND is_active AND (expires_at IS NULL OR expires_at > $2)"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .bind(now)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn effective_permissions_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {GRANTED_PERMISSION_COLUMNS} FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id AND r.is_active \
             JOIN role_permissions rp ON rp.role_id = r.id AND rp.granted \
             JOIN permissions p ON p.id = rp.permission_id AND p.is_active \
             WHERE ur.user_id = $1 AND ur.is_active \
               AND (ur.expires_at IS NULL OR ur.expires_at > $2) \
             ORDER BY p.id"
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(user_id)
            .bind(now)
            .fetch_all(&mut **tx)
            .await?)
    }

    // Invalidation fan-out

    async fn active_user_ids_for_role(
        &self,
        tx: &mut Self::Tx,
        role_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM user_roles \
             WHERE role_id = $1 AND is_active AND (expires_at IS NULL OR expires_at > $2) \
             ORDER BY user_id",
        )
        .bind(role_id)
        .bind(now)
        .fetch_all(&mut **tx)
        .await?)
    }

    async fn role_ids_for_permission(
        &self,
        tx: &mut Self::Tx,
        permission_id: i64,
    ) -> RepoResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT role_id FROM role_permissions WHERE permission_id = $1 ORDER BY role_id",
        )
        .bind(permission_id)
        .fetch_all(&mut **tx)
        .await?)
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
        let sql = format!(
            "UPDATE user_roles SET status = $2, blocked_until = $3, block_reason = $4, \
             updated_at = $5 \
             WHERE user_id = $1 AND is_active AND status IN ($6, $2) \
               AND (expires_at IS NULL OR expires_at > $5) \
             RETURNING {USER_ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .bind(UserRoleStatus::TempBlocked)
            .bind(until)
            .bind(reason)
            .bind(now)
            .bind(UserRoleStatus::Active)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn unblock_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!(
            "UPDATE user_roles SET status = $2, blocked_until = NULL, block_reason = NULL, \
             updated_at = $3 \
             WHERE user_id = $1 AND is_active AND status = $4 \
             RETURNING {USER_ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .bind(UserRoleStatus::Active)
            .bind(now)
            .bind(UserRoleStatus::TempBlocked)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn unblock_expired_user(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!(
            "UPDATE user_roles SET status = $2, blocked_until = NULL, block_reason = NULL, \
             updated_at = $3 \
             WHERE user_id = $1 AND is_active AND status = $4 AND blocked_until <= $3 \
             RETURNING {USER_ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .bind(UserRoleStatus::Active)
            .bind(now)
            .bind(UserRoleStatus::TempBlocked)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn expired_temp_blocked_user_roles(
        &self,
        tx: &mut Self::Tx,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<UserRole>> {
        let sql = format!(
            "SELECT {USER_ROLE_COLUMNS} FROM user_roles \
             WHERE is_active AND status = $1 AND blocked_until <= $2 \
             ORDER BY blocked_until"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(UserRoleStatus::TempBlocked)
            .bind(now)
            .fetch_all(&mut **tx)
            .await?)
    }

    // Active role switching

    async fn deactivate_all_user_roles(&self, tx: &mut Self::Tx, user_id: i64) -> RepoResult<u64> {
        // No is_active filter: the row locks also serialize concurrent switches.
        let result = sqlx::query(
            "UPDATE user_roles SET is_active = false, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn activate_user_role(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        role_id: i64,
    ) -> RepoResult<Option<UserRole>> {
        let sql = format!(
            "UPDATE user_roles SET is_active = true, updated_at = NOW() \
             WHERE user_id = $1 AND role_id = $2 RETURNING {USER_ROLE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .bind(role_id)
            .fetch_optional(&mut **tx)
            .await?)
    }
}
