//! Permission gate and the request permission context.
//!
//! Runs after [`super::auth::auth_middleware`]. The route pattern from
//! `MatchedPath`, minus the API base path, forms the `METHOD:/path` action.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, MatchedPath, Query, RawPathParams, Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};

use super::auth::{request_path, AuthExtension, DeviceId};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::PermissionContext;
use crate::repository::AuthzRepository;

/// Route pattern relative to the API base path.
pub fn action_path(route: &str, base_path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    match route.strip_prefix(base) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => route.to_string(),
    }
}

/// Build the permission context of a request.
///
/// Path parameters land in metadata as `param_<name>`, the first value of
/// each query parameter as `query_<name>`. A numeric `id` parameter also
/// becomes the resource id.
pub fn build_permission_context(
    auth: &AuthExtension,
    request: &Request,
    path_params: &[(String, String)],
    query_params: &[(String, String)],
) -> PermissionContext {
    let mut ctx =
        PermissionContext::new(auth.user_id, auth.user_role_id).with_role_slug(&auth.role_slug);
    let meta = &mut ctx.metadata;

    meta.method = Some(request.method().as_str().to_string());
    meta.path = Some(request_path(request).to_string());
    meta.client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    meta.user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    meta.device_id = request
        .extensions()
        .get::<DeviceId>()
        .map(|DeviceId(id)| id.to_string());

    for (name, value) in path_params {
        meta.insert_param(name, value.clone());
    }
    meta.resource_id = meta.param("id").and_then(|id| id.parse().ok());

    for (name, value) in query_params {
        if meta.query(name).is_none() {
            meta.insert_query(name, value.clone());
        }
    }

    ctx
}

/// Permission middleware - rejects with 403 unless the caller's active role
/// grants the matched route.
pub async fn permission_middleware<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    path_params: Option<RawPathParams>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let auth = request
        .extensions()
        .get::<AuthExtension>()
        .cloned()
        .ok_or_else(|| AppError::Authentication("Missing identity".into()))?;

    if auth.is_public {
        return Ok(next.run(request).await);
    }

    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => request_path(&request).to_string(),
    };
    let path = action_path(&route, &state.config.api_base_path);
    let method = request.method().as_str().to_string();

    let path_params: Vec<(String, String)> = path_params
        .map(|params| {
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let query_params = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    let ctx = build_permission_context(&auth, &request, &path_params, &query_params);

    let allowed = state
        .authz
        .has_http_permission_with_context(&method, &path, &ctx)
        .await?;
    if !allowed {
        tracing::debug!(user_id = auth.user_id, %method, %path, "Permission denied");
        return Err(AppError::Authorization(format!(
            "{} {} is not permitted",
            method, path
        )));
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn auth() -> AuthExtension {
        AuthExtension {
            user_id: 42,
            user_role_id: 3,
            role_slug: "owner".into(),
            is_public: false,
        }
    }

    #[test]
    fn test_action_path_strips_base() {
        assert_eq!(action_path("/api/v1/listings/:id", "/api/v1"), "/listings/:id");
        assert_eq!(action_path("/api/v1", "/api/v1/"), "/");
        assert_eq!(action_path("/api/v10/roles", "/api/v1"), "/api/v10/roles");
        assert_eq!(action_path("/other", "/api/v1"), "/other");
    }

    #[test]
    fn test_build_permission_context() {
        let mut request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/listings/17?sort=asc&sort=desc")
            .header(USER_AGENT, "curl/8")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        let params = vec![("id".to_string(), "17".to_string())];
        let query = vec![
            ("sort".to_string(), "asc".to_string()),
            ("sort".to_string(), "desc".to_string()),
        ];
        let ctx = build_permission_context(&auth(), &request, &params, &query);

        assert_eq!(ctx.user_id, 42);
        assert_eq!(ctx.user_role_id, 3);
        assert_eq!(ctx.role_slugs, vec!["owner".to_string()]);
        let meta = &ctx.metadata;
        assert_eq!(meta.method.as_deref(), Some("DELETE"));
        assert_eq!(meta.path.as_deref(), Some("/api/v1/listings/17"));
        assert_eq!(meta.client_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(meta.param("id"), Some("17"));
        assert_eq!(meta.resource_id, Some(17));
        assert_eq!(meta.query("sort"), Some("asc"));
    }
}
