//! Request tracing middleware with correlation ID and W3C Trace Context support.
//!
//! Each request runs inside an `http_request` span so repository and service
//! spans nest under it when OpenTelemetry is enabled.

use axum::{extract::Request, http::header::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// The header name for correlation IDs.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// W3C Trace Context header.
const TRACEPARENT_HEADER: &str = "traceparent";

/// Extension that holds the correlation ID for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Correlation id from the request headers, if any.
    ///
    /// `X-Correlation-ID` wins; otherwise the trace id of a `traceparent`
    /// (`version-traceid-parentid-flags`).
    pub fn from_request(request: &Request) -> Option<Self> {
        let headers = request.headers();
        if let Some(id) = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.trim().is_empty())
        {
            return Some(Self(id.trim().to_string()));
        }
        headers
            .get(TRACEPARENT_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|tp| tp.split('-').nth(1))
            .filter(|trace_id| !trace_id.is_empty())
            .map(|trace_id| Self(trace_id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation ID middleware.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id =
        CorrelationId::from_request(&request).unwrap_or_else(CorrelationId::generate);

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
        user_id = tracing::field::Empty,
    );

    async move {
        let mut response = next.run(request).await;

        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        tracing::info!(
            correlation_id = %correlation_id,
            status = %response.status().as_u16(),
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_correlation_id_generate() {
        let id = CorrelationId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_explicit_header_wins() {
        let req = request(&[
            ("x-correlation-id", "abc"),
            ("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        ]);
        assert_eq!(CorrelationId::from_request(&req).unwrap().as_str(), "abc");
    }

    #[test]
    fn test_traceparent_trace_id() {
        let req = request(&[(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )]);
        assert_eq!(
            CorrelationId::from_request(&req).unwrap().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert!(CorrelationId::from_request(&request(&[])).is_none());
    }
}
