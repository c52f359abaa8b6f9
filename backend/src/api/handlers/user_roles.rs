//! Per-user role assignment, active-role switching and temp-block handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::SharedState;
use crate::error::{codes, AppError, Result};
use crate::models::{Permission, UserRole};
use crate::repository::AuthzRepository;

/// Routes nested under `/users/:user_id`
pub fn router<R: AuthzRepository>() -> Router<SharedState<R>> {
    Router::new()
        .route("/roles", get(list_user_roles::<R>).post(assign_role::<R>))
        .route(
            "/active-role",
            get(get_active_role::<R>).put(switch_active_role::<R>),
        )
        .route("/block", get(block_status::<R>).post(block_user::<R>))
        .route("/unblock", post(unblock_user::<R>))
        .route("/permissions", get(user_permissions::<R>))
        .route("/permissions/refresh", post(refresh_permissions::<R>))
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchActiveRoleRequest {
    pub role_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BlockUserRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BlockStatusResponse {
    pub user_id: i64,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
}

pub async fn list_user_roles<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<UserRole>>> {
    Ok(Json(state.authz.list_user_roles(user_id).await?))
}

pub async fn assign_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<(StatusCode, Json<UserRole>)> {
    let assignment = state
        .authz
        .assign_role_to_user(user_id, payload.role_id, payload.expires_at)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn get_active_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserRole>> {
    state
        .authz
        .get_active_user_role(user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} has no active role", user_id)))
}

pub async fn switch_active_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SwitchActiveRoleRequest>,
) -> Result<Json<UserRole>> {
    state
        .authz
        .switch_active_role(user_id, payload.role_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::precondition(
                codes::NO_ACTIVE_ROLE,
                format!("User {} does not hold role {}", user_id, payload.role_id),
            )
        })
}

pub async fn block_status<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
) -> Result<Json<BlockStatusResponse>> {
    let now = Utc::now();
    let active = state.authz.get_active_user_role(user_id).await?;
    let blocked_until = active
        .filter(|ur| ur.is_temp_blocked(now))
        .and_then(|ur| ur.blocked_until);
    Ok(Json(BlockStatusResponse {
        user_id,
        blocked: blocked_until.is_some(),
        blocked_until,
    }))
}

pub async fn block_user<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<BlockUserRequest>,
) -> Result<Json<UserRole>> {
    let reason = payload.reason.trim();
    if reason.is_empty() {
        return Err(AppError::invalid_field("reason", "must not be empty"));
    }
    state
        .authz
        .temp_block_user(user_id, reason, Utc::now())
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::precondition(
                codes::NO_ACTIVE_ROLE,
                format!("User {} has no active role to block", user_id),
            )
        })
}

pub async fn unblock_user<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserRole>> {
    state
        .authz
        .lift_temp_block(user_id, Utc::now())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} is not temp-blocked", user_id)))
}

pub async fn user_permissions<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Permission>>> {
    Ok(Json(state.authz.get_user_permissions(user_id).await?))
}

pub async fn refresh_permissions<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Permission>>> {
    Ok(Json(state.authz.refresh_user_permissions(user_id).await?))
}
