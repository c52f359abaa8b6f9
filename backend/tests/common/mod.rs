//! Common test utilities for backend integration and handler tests
//!
//! This module provides shared infrastructure for testing:
//! - In-memory authorization service with the marketplace seed
//! - Full application router over the in-memory repository
//! - Token helpers

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;

use realty_backend::api::{self, AppState};
use realty_backend::cache::MemoryPermissionCache;
use realty_backend::config::Config;
use realty_backend::models::{
    NewPermission, NewRole, NewRolePermission, NewUserRole, UserRoleStatus,
};
use realty_backend::repository::MemoryAuthzRepository;
use realty_backend::services::authorization_service::{
    AuthorizationService, AuthorizationSettings,
};
use realty_backend::services::token_service::UserInfo;

pub const OWNER_ROLE_ID: i64 = 10;
pub const CREATE_LISTING_PERMISSION_ID: i64 = 100;
pub const OWNER_GRANT_ID: i64 = 1;
pub const OWNER_USER_ID: i64 = 42;
pub const OWNER_USER_ROLE_ID: i64 = 1;

/// Test context: in-memory repository and cache behind a real service.
pub struct TestContext {
    pub config: Config,
    pub repo: Arc<MemoryAuthzRepository>,
    pub cache: Arc<MemoryPermissionCache>,
    pub authz: Arc<AuthorizationService<MemoryAuthzRepository>>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::for_testing())
    }

    pub fn with_config(config: Config) -> Self {
        let repo = Arc::new(MemoryAuthzRepository::new());
        let cache = Arc::new(MemoryPermissionCache::new());
        let authz = Arc::new(AuthorizationService::new(
            repo.clone(),
            cache.clone(),
            AuthorizationSettings::from_config(&config),
        ));
        Self {
            config,
            repo,
            cache,
            authz,
        }
    }

    /// Owner role 10, permission 100 `POST:/listings`, user 42 active on role 10.
    /// The grant (id 1) is only seeded when `with_grant` is set.
    pub async fn seed_owner(&self, with_grant: bool) {
        self.repo
            .seed_role(OWNER_ROLE_ID, role("Owner", "owner", false))
            .await;
        self.repo
            .seed_permission(
                CREATE_LISTING_PERMISSION_ID,
                permission("create_listing", "listing", "POST:/listings"),
            )
            .await;
        if with_grant {
            self.repo
                .seed_role_permission(
                    OWNER_GRANT_ID,
                    grant(OWNER_ROLE_ID, CREATE_LISTING_PERMISSION_ID),
                )
                .await;
        }
        self.repo
            .seed_user_role(
                OWNER_USER_ROLE_ID,
                active_assignment(OWNER_USER_ID, OWNER_ROLE_ID),
            )
            .await;
    }

    /// The full application router over this context.
    pub fn router(&self) -> Router {
        api::routes::create_router(Arc::new(self.state()))
    }

    pub fn state(&self) -> AppState<MemoryAuthzRepository> {
        AppState::new(self.config.clone(), self.authz.clone())
    }

    /// Bearer token for `user_id` on the given assignment and role slug.
    pub fn token(&self, user_id: i64, user_role_id: i64, role_slug: &str) -> String {
        self.state()
            .tokens
            .issue(UserInfo {
                id: user_id,
                user_role_id,
                role_slug: role_slug.to_string(),
            })
            .expect("token issue")
    }

    pub fn owner_token(&self) -> String {
        self.token(OWNER_USER_ID, OWNER_USER_ROLE_ID, "owner")
    }
}

pub fn role(name: &str, slug: &str, system: bool) -> NewRole {
    NewRole {
        name: name.into(),
        slug: slug.into(),
        description: None,
        is_system_role: system,
    }
}

pub fn permission(name: &str, resource: &str, action: &str) -> NewPermission {
    NewPermission {
        name: name.into(),
        resource: resource.into(),
        action: action.into(),
        description: None,
        conditions: None,
    }
}

pub fn grant(role_id: i64, permission_id: i64) -> NewRolePermission {
    NewRolePermission {
        role_id,
        permission_id,
        granted: true,
        conditions: None,
    }
}

pub fn active_assignment(user_id: i64, role_id: i64) -> NewUserRole {
    NewUserRole {
        user_id,
        role_id,
        is_active: true,
        status: UserRoleStatus::Active,
        expires_at: None,
    }
}

pub fn inactive_assignment(user_id: i64, role_id: i64) -> NewUserRole {
    NewUserRole {
        is_active: false,
        ..active_assignment(user_id, role_id)
    }
}

/// Request builder with an optional bearer token.
pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("request")
}

/// JSON request builder with a bearer token.
pub fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
