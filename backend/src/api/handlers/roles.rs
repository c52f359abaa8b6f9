//! Role management handlers.

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
use crate::models::{LikePattern, NewRole, Permission, Role, RoleFilter, RoleUpdate};
use crate::repository::AuthzRepository;

/// Create role routes
pub fn router<R: AuthzRepository>() -> Router<SharedState<R>> {
    Router::new()
        .route("/", get(list_roles::<R>).post(create_role::<R>))
        .route(
            "/:id",
            get(get_role::<R>)
                .put(update_role::<R>)
                .delete(delete_role::<R>),
        )
        .route("/:id/permissions", get(list_role_permissions::<R>))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRolesQuery {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub is_system_role: Option<bool>,
    pub is_active: Option<bool>,
    pub id_from: Option<i64>,
    pub id_to: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListRolesQuery {
    fn filter(&self) -> RoleFilter {
        RoleFilter {
            name: LikePattern::from_search(self.name.as_deref()),
            slug: LikePattern::from_search(self.slug.as_deref()),
            description: LikePattern::from_search(self.description.as_deref()),
            is_system_role: self.is_system_role,
            is_active: self.is_active,
            id_from: self.id_from,
            id_to: self.id_to,
        }
    }
}

pub async fn list_roles<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Query(query): Query<ListRolesQuery>,
) -> Result<Json<ListResponse<Role>>> {
    let page = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let roles = state
        .authz
        .list_roles(query.filter(), page.to_request())
        .await?;
    Ok(Json(roles.into()))
}

pub async fn create_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Json(payload): Json<NewRole>,
) -> Result<(StatusCode, Json<Role>)> {
    let role = state.authz.create_role(payload).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<Role>> {
    Ok(Json(state.authz.get_role(id).await?))
}

pub async fn update_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
    Json(payload): Json<RoleUpdate>,
) -> Result<Json<Role>> {
    Ok(Json(state.authz.update_role(id, payload).await?))
}

/// Deactivates the role; the response carries the updated row.
pub async fn delete_role<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<Role>> {
    Ok(Json(state.authz.delete_role(id).await?))
}

pub async fn list_role_permissions<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Permission>>> {
    state.authz.get_role(id).await?;
    Ok(Json(state.authz.get_role_permissions(id).await?))
}
