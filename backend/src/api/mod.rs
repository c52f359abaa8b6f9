//! API module - HTTP handlers and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::repository::AuthzRepository;
use crate::services::authorization_service::AuthorizationService;
use crate::services::signin_attempts::SigninAttemptGuard;
use crate::services::token_service::TokenService;

use self::middleware::auth::PublicEndpoints;

/// Application state shared across handlers
pub struct AppState<R: AuthzRepository> {
    pub config: Config,
    pub authz: Arc<AuthorizationService<R>>,
    pub tokens: Arc<TokenService>,
    /// Fed by the sign-in flow via `record_failure`; aged out by the block sweeper.
    pub signin_guard: Arc<SigninAttemptGuard>,
    pub public_endpoints: Arc<PublicEndpoints>,
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl<R: AuthzRepository> AppState<R> {
    pub fn new(config: Config, authz: Arc<AuthorizationService<R>>) -> Self {
        Self {
            tokens: Arc::new(TokenService::new(&config)),
            signin_guard: Arc::new(SigninAttemptGuard::from_config(&config)),
            public_endpoints: Arc::new(PublicEndpoints::new(&config.api_base_path)),
            metrics_handle: None,
            authz,
            config,
        }
    }

    /// Set the Prometheus metrics handle for rendering /metrics output.
    pub fn set_metrics_handle(&mut self, handle: PrometheusHandle) {
        self.metrics_handle = Some(Arc::new(handle));
    }
}

pub type SharedState<R> = Arc<AppState<R>>;
