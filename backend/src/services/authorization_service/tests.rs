use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use super::*;
use crate::cache::MemoryPermissionCache;
use crate::error::{codes, AppError};
use crate::models::{
    NewPermission, NewRole, NewRolePermission, NewUserRole, PageRequest, Patch, PermissionUpdate,
    RoleFilter, RoleUpdate, UserRoleStatus,
};
use crate::repository::MemoryAuthzRepository;

struct Fixture {
    repo: Arc<MemoryAuthzRepository>,
    cache: Arc<MemoryPermissionCache>,
    authz: AuthorizationService<MemoryAuthzRepository>,
}

fn role(name: &str, slug: &str, system: bool) -> NewRole {
    NewRole {
        name: name.into(),
        slug: slug.into(),
        description: None,
        is_system_role: system,
    }
}

fn permission(name: &str, resource: &str, action: &str) -> NewPermission {
    NewPermission {
        name: name.into(),
        resource: resource.into(),
        action: action.into(),
        description: None,
        conditions: None,
    }
}

fn grant(role_id: i64, permission_id: i64) -> NewRolePermission {
    NewRolePermission {
        role_id,
        permission_id,
        granted: true,
        conditions: None,
    }
}

fn active_assignment(user_id: i64, role_id: i64) -> NewUserRole {
    NewUserRole {
        user_id,
        role_id,
        is_active: true,
        status: UserRoleStatus::Active,
        expires_at: None,
    }
}

fn fixture() -> Fixture {
    let repo = Arc::new(MemoryAuthzRepository::new());
    let cache = Arc::new(MemoryPermissionCache::new());
    let authz = AuthorizationService::new(
        repo.clone(),
        cache.clone(),
        AuthorizationSettings::default(),
    );
    Fixture { repo, cache, authz }
}

/// Owner role 10 granting `POST:/listings` (permission 100, grant 1) to user 42.
async fn seeded() -> Fixture {
    let f = fixture();
    f.repo.seed_role(10, role("Owner", "owner", false)).await;
    f.repo
        .seed_permission(100, permission("create_listing", "listing", "POST:/listings"))
        .await;
    f.repo.seed_role_permission(1, grant(10, 100)).await;
    f.repo.seed_user_role(1, active_assignment(42, 10)).await;
    f
}

#[tokio::test]
async fn test_create_role_normalizes_slug() {
    let f = fixture();
    let created = f
        .authz
        .create_role(role("  Realtor ", "Realtor", false))
        .await
        .unwrap();
    assert_eq!(created.slug, "realtor");
    assert_eq!(created.name, "Realtor");
    assert!(created.is_active);

    let dup = f.authz.create_role(role("Other", "REALTOR", false)).await;
    assert!(matches!(dup, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_create_role_rejects_bad_input() {
    let f = fixture();
    let bad_slug = f.authz.create_role(role("Broken", "has space", false)).await;
    assert!(matches!(bad_slug, Err(AppError::Validation { .. })));
    let no_name = f.authz.create_role(role("   ", "valid", false)).await;
    assert!(matches!(no_name, Err(AppError::Validation { .. })));
}

#[tokio::test]
async fn test_delete_admin_role_refused() {
    let f = fixture();
    f.repo.seed_role(1, role("Admin", "admin", true)).await;

    let err = f.authz.delete_role(1).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition { code, .. } if code == codes::ADMIN_ROLE_PROTECTED
    ));
    assert!(f.authz.get_role(1).await.unwrap().is_active);
}

#[tokio::test]
async fn test_delete_system_role_refused() {
    let f = fixture();
    f.repo.seed_role(2, role("Support", "support", true)).await;
    let err = f.authz.delete_role(2).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition { code, .. } if code == codes::SYSTEM_ROLE_PROTECTED
    ));
}

#[tokio::test]
async fn test_delete_role_in_use_refused() {
    let f = seeded().await;
    let err = f.authz.delete_role(10).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition { code, .. } if code == codes::ROLE_IN_USE
    ));
    assert!(f.authz.get_role(10).await.unwrap().is_active);
}

#[tokio::test]
async fn test_delete_unused_role_deactivates() {
    let f = fixture();
    f.repo.seed_role(5, role("Visitor", "visitor", false)).await;
    let deleted = f.authz.delete_role(5).await.unwrap();
    assert!(!deleted.is_active);
    assert!(matches!(f.authz.delete_role(404).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_update_role_requires_name() {
    let f = seeded().await;
    let update = RoleUpdate {
        name: " ".into(),
        ..RoleUpdate::default()
    };
    assert!(matches!(
        f.authz.update_role(10, update).await,
        Err(AppError::Validation { .. })
    ));

    let update = RoleUpdate {
        name: "Property owner".into(),
        description: Patch::Value("Owns listings".into()),
        is_active: None,
    };
    let updated = f.authz.update_role(10, update).await.unwrap();
    assert_eq!(updated.name, "Property owner");
    assert_eq!(updated.slug, "owner");
    assert_eq!(updated.description.as_deref(), Some("Owns listings"));
}

#[tokio::test]
async fn test_list_roles_paginates() {
    let f = fixture();
    for (id, slug) in [(1, "admin"), (2, "owner"), (3, "realtor")] {
        f.repo.seed_role(id, role(slug, slug, false)).await;
    }
    let page = f
        .authz
        .list_roles(RoleFilter::default(), PageRequest::new(Some(1), Some(2)))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages(), 2);
}

#[tokio::test]
async fn test_create_permission_validates_and_normalizes() {
    let f = fixture();
    let created = f
        .authz
        .create_permission(permission("approve_listing", "listing", "post:/listings/:id/approve"))
        .await
        .unwrap();
    assert_eq!(created.action, "POST:/listings/:id/approve");

    let dup_name = f
        .authz
        .create_permission(permission("approve_listing", "listing", "approve"))
        .await;
    assert!(matches!(dup_name, Err(AppError::Conflict(_))));

    let dup_pair = f
        .authz
        .create_permission(permission("other", "listing", "POST:/listings/:id/approve"))
        .await;
    assert!(matches!(dup_pair, Err(AppError::Conflict(_))));

    let mut bad = permission("bad", "listing", "delete");
    bad.conditions = Some(json!({"owner": "everyone"}));
    assert!(matches!(
        f.authz.create_permission(bad).await,
        Err(AppError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_http_permission_allowed_and_memoized() {
    let f = seeded().await;
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
    assert!(!f.authz.has_http_permission(42, "GET", "/listings").await.unwrap());

    let stats = f.cache.stats();
    assert_eq!(stats.effective_entries, 1);
    assert_eq!(stats.decision_entries, 2);
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
}

#[tokio::test]
async fn test_user_without_active_role_denied() {
    let f = seeded().await;
    assert!(!f.authz.has_http_permission(7, "POST", "/listings").await.unwrap());
    assert!(f.cache.is_empty());
}

#[tokio::test]
async fn test_revoke_invalidates_cache() {
    let f = seeded().await;
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());

    f.authz.delete_role_permission(1).await.unwrap();
    assert!(!f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
}

#[tokio::test]
async fn test_failed_commit_keeps_cache() {
    let f = seeded().await;
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());

    f.repo.set_fail_commits(true);
    assert!(f.authz.revoke_permission_from_role(10, 100).await.is_err());
    f.repo.set_fail_commits(false);

    assert_eq!(f.cache.stats().effective_entries, 1);
    assert_eq!(f.repo.snapshot().await.role_permissions.len(), 1);
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
}

#[tokio::test]
async fn test_explicit_deny_removes_permission() {
    let f = fixture();
    f.repo.seed_role(10, role("Owner", "owner", false)).await;
    f.repo
        .seed_permission(100, permission("create_listing", "listing", "POST:/listings"))
        .await;
    f.repo
        .seed_role_permission(
            1,
            NewRolePermission {
                granted: false,
                ..grant(10, 100)
            },
        )
        .await;
    f.repo.seed_user_role(1, active_assignment(42, 10)).await;

    assert!(!f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
    assert!(f.authz.get_user_permissions(42).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_grant_conditions_override_permission() {
    let f = fixture();
    f.repo.seed_role(10, role("Owner", "owner", false)).await;
    f.repo
        .seed_permission(200, permission("delete_listing", "listing", "DELETE:/listings/:id"))
        .await;
    f.repo
        .seed_role_permission(
            1,
            NewRolePermission {
                conditions: Some(json!({"owner": "self"})),
                ..grant(10, 200)
            },
        )
        .await;
    f.repo.seed_user_role(1, active_assignment(42, 10)).await;

    let mine = PermissionContext::new(42, 1).with_resource_owner(42);
    let theirs = PermissionContext::new(42, 1).with_resource_owner(99);
    assert!(f.authz.has_permission(42, "listing", "delete", &mine).await.unwrap());
    assert!(!f.authz.has_permission(42, "listing", "delete", &theirs).await.unwrap());
    // Conditional outcomes depend on the request and are never memoized.
    assert_eq!(f.cache.stats().decision_entries, 0);
}

#[tokio::test]
async fn test_update_permission_fans_out() {
    let f = seeded().await;
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());

    let update = PermissionUpdate {
        conditions: Patch::Value(json!({"owner": "self"})),
        ..PermissionUpdate::default()
    };
    f.authz.update_permission(100, update).await.unwrap();

    // No resource owner in a bare HTTP check, so the new condition denies.
    assert!(!f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
}

#[tokio::test]
async fn test_delete_permission_fans_out() {
    let f = seeded().await;
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
    f.authz.delete_permission(100).await.unwrap();
    assert!(!f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
    assert!(f.repo.snapshot().await.role_permissions.is_empty());
}

#[tokio::test]
async fn test_create_role_permission_checks_referents() {
    let f = seeded().await;
    assert!(matches!(
        f.authz.create_role_permission(grant(10, 999)).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        f.authz.create_role_permission(grant(10, 100)).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        f.authz.revoke_permission_from_role(10, 999).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_grant_reaches_cached_user() {
    let f = seeded().await;
    f.repo
        .seed_permission(101, permission("list_listings", "listing", "GET:/listings"))
        .await;
    assert!(!f.authz.has_http_permission(42, "GET", "/listings").await.unwrap());

    f.authz.grant_permission_to_role(10, 101).await.unwrap();
    assert!(f.authz.has_http_permission(42, "GET", "/listings").await.unwrap());
    assert_eq!(f.authz.get_role_permissions(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_assign_and_switch_active_role() {
    let f = seeded().await;
    f.repo.seed_role(20, role("Realtor", "realtor", false)).await;

    let assigned = f.authz.assign_role_to_user(42, 20, None).await.unwrap();
    assert!(!assigned.is_active);
    assert!(matches!(
        f.authz.assign_role_to_user(42, 20, None).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        f.authz.assign_role_to_user(42, 404, None).await,
        Err(AppError::NotFound(_))
    ));

    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
    let switched = f.authz.switch_active_role(42, 20).await.unwrap().unwrap();
    assert_eq!(switched.role_id, 20);
    assert_eq!(
        f.authz.get_active_user_role(42).await.unwrap().unwrap().role_id,
        20
    );
    // The realtor role grants nothing and the cache was dropped on switch.
    assert!(!f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());

    let active_rows = f
        .repo
        .snapshot()
        .await
        .user_roles
        .values()
        .filter(|ur| ur.user_id == 42 && ur.is_active)
        .count();
    assert_eq!(active_rows, 1);
    assert_eq!(f.authz.list_user_roles(42).await.unwrap().len(), 2);
}

#[test]
fn test_settings_carry_configured_block_duration() {
    let mut config = Config::for_testing();
    config.temp_block_duration = std::time::Duration::from_secs(20 * 60);
    let settings = AuthorizationSettings::from_config(&config);
    assert_eq!(settings.temp_block_duration, Duration::minutes(20));

    config.temp_block_duration = std::time::Duration::MAX;
    let settings = AuthorizationSettings::from_config(&config);
    assert_eq!(settings.temp_block_duration, Duration::minutes(15));
}

#[tokio::test]
async fn test_switch_to_unheld_role() {
    let f = seeded().await;
    assert!(f.authz.switch_active_role(42, 77).await.unwrap().is_none());

    let active = f.authz.get_active_user_role(42).await.unwrap().unwrap();
    assert_eq!(active.role_id, 10);
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
}

#[tokio::test]
async fn test_block_and_unblock_roundtrip() {
    let f = seeded().await;
    let t0 = Utc::now();

    let blocked = f
        .authz
        .temp_block_user(42, "too many attempts", t0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blocked.status, UserRoleStatus::TempBlocked);
    assert_eq!(blocked.blocked_until, Some(t0 + Duration::minutes(15)));

    assert!(f.authz.is_user_temp_blocked(42, t0 + Duration::minutes(1)).await.unwrap());
    assert!(!f.authz.is_user_temp_blocked(42, t0 + Duration::minutes(16)).await.unwrap());
    assert!(!f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());

    let unblocked = f.authz.lift_temp_block(42, t0).await.unwrap().unwrap();
    assert_eq!(unblocked.status, UserRoleStatus::Active);
    assert_eq!(unblocked.blocked_until, None);
    assert!(f.authz.has_http_permission(42, "POST", "/listings").await.unwrap());
}

#[tokio::test]
async fn test_block_without_active_role() {
    let f = fixture();
    let now = Utc::now();
    assert!(f.authz.temp_block_user(7, "x", now).await.unwrap().is_none());
    assert!(f.authz.lift_temp_block(7, now).await.unwrap().is_none());
    assert!(!f.authz.is_user_temp_blocked(7, now).await.unwrap());
}

#[tokio::test]
async fn test_expired_blocks_listed() {
    let f = seeded().await;
    let t0 = Utc::now();
    f.authz.temp_block_user(42, "x", t0).await.unwrap();

    assert!(f.authz.expired_temp_blocked_users(t0).await.unwrap().is_empty());
    let expired = f
        .authz
        .expired_temp_blocked_users(t0 + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].user_id, 42);
}

#[tokio::test]
async fn test_refresh_user_permissions() {
    let f = seeded().await;
    let permissions = f.authz.refresh_user_permissions(42).await.unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].id, 100);
    assert_eq!(f.cache.stats().effective_entries, 1);

    f.authz.invalidate_user_cache(42, "test").await.unwrap();
    assert!(f.cache.is_empty());
}
