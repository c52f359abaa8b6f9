//! Permission management handlers.

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
use crate::models::{LikePattern, NewPermission, Permission, PermissionFilter, PermissionUpdate};
use crate::repository::AuthzRepository;

/// Create permission routes
pub fn router<R: AuthzRepository>() -> Router<SharedState<R>> {
    Router::new()
        .route("/", get(list_permissions::<R>).post(create_permission::<R>))
        .route(
            "/:id",
            get(get_permission::<R>)
                .put(update_permission::<R>)
                .delete(delete_permission::<R>),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPermissionsQuery {
    pub name: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_permissions<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Query(query): Query<ListPermissionsQuery>,
) -> Result<Json<ListResponse<Permission>>> {
    let filter = PermissionFilter {
        name: LikePattern::from_search(query.name.as_deref()),
        resource: LikePattern::from_search(query.resource.as_deref()),
        action: LikePattern::from_search(query.action.as_deref()),
        is_active: query.is_active,
    };
    let page = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let permissions = state
        .authz
        .list_permissions(filter, page.to_request())
        .await?;
    Ok(Json(permissions.into()))
}

pub async fn create_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Json(payload): Json<NewPermission>,
) -> Result<(StatusCode, Json<Permission>)> {
    let permission = state.authz.create_permission(payload).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn get_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<Permission>> {
    Ok(Json(state.authz.get_permission(id).await?))
}

pub async fn update_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
    Json(payload): Json<PermissionUpdate>,
) -> Result<Json<Permission>> {
    Ok(Json(state.authz.update_permission(id, payload).await?))
}

pub async fn delete_permission<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.authz.delete_permission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
