//! Prometheus counters for authorization decisions and HTTP traffic.

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Request, Response},
    middleware::Next,
};
use metrics::{counter, gauge, histogram};

/// Axum middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    // Route patterns keep label cardinality bounded; unmatched paths are normalized.
    let path = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_path(request.uri().path()),
    };

    let start = Instant::now();
    gauge!("realty_http_requests_in_flight").increment(1.0);

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    histogram!("realty_http_request_duration_seconds", "method" => method.clone(), "path" => path.clone())
        .record(start.elapsed().as_secs_f64());
    counter!("realty_http_responses_total", "method" => method, "path" => path, "status" => status)
        .increment(1);
    gauge!("realty_http_requests_in_flight").decrement(1.0);

    response
}

/// Replace UUID and numeric path segments with `:id`.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            let is_uuid = seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4;
            if is_uuid || (!seg.is_empty() && seg.parse::<i64>().is_ok()) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Record the outcome of a permission check (`allow`, `deny`, `no_active_role`).
pub fn record_authz_check(outcome: &'static str) {
    counter!("authz_checks_total", "outcome" => outcome).increment(1);
}

/// Record an effective-permission cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("authz_cache_total", "result" => result).increment(1);
}

pub fn record_temp_block() {
    counter!("authz_temp_blocks_total").increment(1);
}

pub fn record_sweeper_unblocked(count: u64) {
    counter!("authz_sweeper_unblocked_total").increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/users/550e8400-e29b-41d4-a716-446655440000/roles";
        assert_eq!(normalize_path(path), "/api/v1/users/:id/roles");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/roles/123"), "/api/v1/roles/:id");
    }

    #[test]
    fn test_normalize_path_no_change() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }
}
