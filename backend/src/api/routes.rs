//! Route definitions for the API.

use std::any::Any;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::auth::auth_middleware;
use super::middleware::permission::permission_middleware;
use super::middleware::security_headers::security_headers_middleware;
use super::middleware::tracing::correlation_id_middleware;
use super::SharedState;
use crate::repository::AuthzRepository;
use crate::services::metrics_service::metrics_middleware;

/// Create the main API router.
///
/// Every route lives under the configured base path and passes the
/// authentication gate and then the permission gate. Public endpoints are
/// admitted by both gates under the root identity.
pub fn create_router<R: AuthzRepository>(state: SharedState<R>) -> Router {
    let base_path = state.config.api_base_path.trim_end_matches('/').to_string();

    let api = api_routes::<R>()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            permission_middleware::<R>,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<R>,
        ));

    Router::new()
        .nest(&base_path, api)
        .layer(middleware::from_fn(correlation_id_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
        .with_state(state)
}

fn api_routes<R: AuthzRepository>() -> Router<SharedState<R>> {
    Router::new()
        // Health and metrics endpoints (public)
        .route("/health", get(handlers::health::health_check::<R>))
        .route("/healthz", get(handlers::health::health_check::<R>))
        .route("/readyz", get(handlers::health::readiness_check::<R>))
        .route("/metrics", get(handlers::health::metrics::<R>))
        .nest("/roles", handlers::roles::router::<R>())
        .nest("/permissions", handlers::permissions::router::<R>())
        .nest("/role-permissions", handlers::role_permissions::router::<R>())
        .nest("/users/:user_id", handlers::user_roles::router::<R>())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "code": "INTERNAL_ERROR",
            "message": "Internal server error",
        })),
    )
        .into_response()
}
