//! Role-permission grant handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::dto::{ListResponse, PaginationQuery};
use crate::api::SharedState;
use crate::error::Result;
use crate::models::{NewRolePermission, RolePermission, RolePermissionFilter, RolePermissionUpdate};
use crate::repository::AuthzRepository;

pub fn router<R: AuthzRepository>() -> Router<SharedState<R>> {
    Router::new()
        .route(
            "/",
            get(list_role_permissions::<R>).post(create_role_permission::<R>),
        )
        .route(
            "/:id",
            get(get_role_permission::<R>)
                .put(update_role_permission::<R>)
                .delete(delete_role_permission::<R>),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRolePermissionsQuery {
    pub role_id: Option<i64>,
    pub permission_id: Option<i64>,
    pub granted: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_role_permissions<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Query(query): Query<ListRolePermissionsQuery>,
) -> Result<Json<ListResponse<RolePermission>>> {
    let filter = RolePermissionFilter {
        role_id: query.role_id,
        permission_id: query.permission_id,
        granted: query.granted,
    };
    let page = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let grants = state
        .authz
        .list_role_permissions(filter, page.to_request())
        .await?;
    Ok(Json(grants.into()))
}

pub async fn create_role_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Json(payload): Json<NewRolePermission>,
) -> Result<(StatusCode, Json<RolePermission>)> {
    let grant = state.authz.create_role_permission(payload).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn get_role_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<RolePermission>> {
    Ok(Json(state.authz.get_role_permission(id).await?))
}

pub async fn update_role_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
    Json(payload): Json<RolePermissionUpdate>,
) -> Result<Json<RolePermission>> {
    Ok(Json(state.authz.update_role_permission(id, payload).await?))
}

pub async fn delete_role_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.authz.delete_role_permission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
