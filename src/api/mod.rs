use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, Request, header};
use axum::{Router, routing::post};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    LatencyUnit,
    trace::{DefaultOnResponse, TraceLayer},
};

use crate::engine::PageAnalyzer;

pub mod handlers;
pub mod models;

/// Largest accepted request body (1 MiB).
pub const MAX_REQUEST_BODY: usize = 1 << 20;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<dyn PageAnalyzer>,
    /// Overall budget for one analysis.
    pub analyze_timeout: Duration,
}

pub fn create_router(analyzer: Arc<dyn PageAnalyzer>, analyze_timeout: Duration) -> Router {
    let state = AppState {
        analyzer,
        analyze_timeout,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        })
        // one INFO line per request with status and latency
        .on_response(
            DefaultOnResponse::new()
                .level(tracing::Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    Router::new()
        .route("/analyze", post(handlers::analyze_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(trace)
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
}
