//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Generates X-Request-Id (UUIDv4) when absent
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Propagate ID     │ ← Copies X-Request-Id onto the response
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← Request span carrying the request id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 above MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! - `POST /api/v1/order` - Create an order
//! - `GET /health`, `GET /ready` - Health & readiness

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Request};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use crate::handlers;
use crate::state::AppState;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    info!(
        max_body_bytes = config.max_request_body_size,
        cors_origins = ?config.cors_allowed_origins,
        "Configuring HTTP middleware"
    );

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("unknown");
            info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id
            )
        }))
        .layer(build_cors_layer(&config.cors_allowed_origins))
        .layer(DefaultBodyLimit::max(config.max_request_body_size));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/order", post(handlers::create_order))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from configuration.
///
/// `*` allows any origin; otherwise only the listed origins are allowed.
/// Entries that are not valid header values are ignored.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::log_client::{LogWriter, MemoryLog, PartitionStrategy};

    fn router() -> (Router, Arc<dyn LogWriter>) {
        let log = MemoryLog::new(1);
        let writer: Arc<dyn LogWriter> = Arc::new(log.writer(PartitionStrategy::LeastBytes));
        (
            build_router(AppState::new(Arc::clone(&writer), Config::default())),
            writer,
        )
    }

    #[test]
    fn test_build_cors_layer_variants() {
        let _any = build_cors_layer(&["*".to_string()]);
        let _specific = build_cors_layer(&[
            "https://example.com".to_string(),
            "not a valid origin\n".to_string(),
        ]);
    }

    #[tokio::test]
    async fn test_response_carries_generated_request_id() {
        let (app, _) = router();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_client_request_id_is_propagated() {
        let (app, _) = router();

        let response = app
            .oneshot(
                Request::get("/health")
                    .header(REQUEST_ID_HEADER, "client-chosen-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "client-chosen-id"
        );
    }

    #[tokio::test]
    async fn test_ready_reflects_writer_state() {
        let (app, writer) = router();

        let ready = app
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        writer.close().await.unwrap();
        let not_ready = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (app, _) = router();

        let response = app
            .oneshot(Request::get("/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
