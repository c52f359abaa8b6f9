//! Authentication middleware.
//!
//! Public endpoints get a synthetic root identity. Every other request needs
//! `Authorization: Bearer <jwt>` and an account that is not temp-blocked.

use std::collections::HashSet;

use axum::{
    extract::{OriginalUri, Request, State},
    http::{header::AUTHORIZATION, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::HttpAction;
use crate::repository::AuthzRepository;
use crate::services::token_service::Claims;

/// Optional device identifier header
pub static X_DEVICE_ID: HeaderName = HeaderName::from_static("x-device-id");

/// Slug carried by the identity installed on public endpoints.
pub const ROOT_ROLE_SLUG: &str = "root";

const PUBLIC_ENDPOINTS: &[(&str, &str)] = &[
    ("POST", "/auth/validate/cpf"),
    ("POST", "/auth/validate/cnpj"),
    ("POST", "/auth/validate/cep"),
    ("POST", "/auth/owner"),
    ("POST", "/auth/realtor"),
    ("POST", "/auth/agency"),
    ("POST", "/auth/signin"),
    ("POST", "/auth/refresh"),
    ("POST", "/auth/password/request"),
    ("POST", "/auth/password/confirm"),
    ("GET", "/health"),
    ("GET", "/healthz"),
    ("GET", "/readyz"),
    ("GET", "/metrics"),
];

/// The set of `METHOD:/path` actions reachable without a token.
///
/// Shared by the authentication and permission gates.
#[derive(Debug, Clone)]
pub struct PublicEndpoints {
    actions: HashSet<String>,
}

impl PublicEndpoints {
    pub fn new(base_path: &str) -> Self {
        let base = base_path.trim_end_matches('/');
        let actions = PUBLIC_ENDPOINTS
            .iter()
            .map(|(method, path)| {
                HttpAction::new(method, &format!("{base}{path}")).as_action()
            })
            .collect();
        Self { actions }
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.actions
            .contains(&HttpAction::new(method.as_str(), path).as_action())
    }
}

/// Extension that holds the authenticated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthExtension {
    pub user_id: i64,
    pub user_role_id: i64,
    pub role_slug: String,
    /// Set for the synthetic identity of public endpoints
    pub is_public: bool,
}

impl AuthExtension {
    pub fn root() -> Self {
        Self {
            user_id: 0,
            user_role_id: 0,
            role_slug: ROOT_ROLE_SLUG.to_string(),
            is_public: true,
        }
    }
}

impl From<Claims> for AuthExtension {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_info.id,
            user_role_id: claims.user_info.user_role_id,
            role_slug: claims.user_info.role_slug,
            is_public: false,
        }
    }
}

/// Validated `X-Device-Id` of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub Uuid);

/// Path as sent by the client, before any nesting strips a prefix.
pub fn request_path(request: &Request) -> &str {
    match request.extensions().get::<OriginalUri>() {
        Some(OriginalUri(uri)) => uri.path(),
        None => request.uri().path(),
    }
}

fn extract_bearer(request: &Request) -> Result<&str> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Authentication("Missing authorization header".into()))?;
    let value = header
        .to_str()
        .map_err(|_| AppError::Authentication("Invalid authorization header".into()))?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Authentication(
            "Invalid authorization header format".into(),
        )),
    }
}

fn extract_device_id(request: &Request, required: bool) -> Result<Option<DeviceId>> {
    match request.headers().get(&X_DEVICE_ID) {
        Some(value) => {
            let raw = value.to_str().map_err(|_| AppError::InvalidDeviceId)?;
            let id = Uuid::parse_str(raw.trim()).map_err(|_| AppError::InvalidDeviceId)?;
            Ok(Some(DeviceId(id)))
        }
        None if required => Err(AppError::MissingDeviceId),
        None => Ok(None),
    }
}

/// Authentication middleware function - requires a valid token on non-public
/// endpoints.
pub async fn auth_middleware<R: AuthzRepository>(
    State(state): State<SharedState<R>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    if state
        .public_endpoints
        .is_public(request.method(), request_path(&request))
    {
        request.extensions_mut().insert(AuthExtension::root());
        return Ok(next.run(request).await);
    }

    let claims = state.tokens.validate(extract_bearer(&request)?)?;
    let auth = AuthExtension::from(claims);

    if let Some(device_id) = extract_device_id(&request, state.config.require_device_id)? {
        request.extensions_mut().insert(device_id);
    }

    if state
        .authz
        .is_user_temp_blocked(auth.user_id, Utc::now())
        .await?
    {
        tracing::info!(user_id = auth.user_id, "Rejected request from temp-blocked user");
        return Err(AppError::Authentication("Account unavailable".into()));
    }

    tracing::Span::current().record("user_id", auth.user_id);
    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_public_endpoints_match_method_and_path() {
        let public = PublicEndpoints::new("/api/v1");
        assert!(public.is_public(&Method::POST, "/api/v1/auth/signin"));
        assert!(public.is_public(&Method::POST, "/api/v1/auth/signin/"));
        assert!(public.is_public(&Method::GET, "/api/v1/healthz"));
        assert!(!public.is_public(&Method::GET, "/api/v1/auth/signin"));
        assert!(!public.is_public(&Method::POST, "/auth/signin"));
        assert!(!public.is_public(&Method::GET, "/api/v1/roles"));
    }

    #[test]
    fn test_extract_bearer() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Bearer abc.def")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&request).unwrap(), "abc.def");

        let request = Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(
            extract_bearer(&request),
            Err(AppError::Authentication(_))
        ));

        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(extract_bearer(&request).is_err());
    }

    #[test]
    fn test_device_id_rules() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_device_id(&request, false).unwrap(), None);
        assert!(matches!(
            extract_device_id(&request, true),
            Err(AppError::MissingDeviceId)
        ));

        let request = Request::builder()
            .header("x-device-id", "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(
            extract_device_id(&request, false),
            Err(AppError::InvalidDeviceId)
        ));

        let id = Uuid::new_v4();
        let request = Request::builder()
            .header("x-device-id", id.to_string())
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_device_id(&request, true).unwrap(), Some(DeviceId(id)));
    }
}
