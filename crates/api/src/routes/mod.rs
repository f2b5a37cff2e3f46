//! Route tree and middleware assembly.
//!
//! ```text
//! /health                    service + pipeline health
//! /api/v1/triggers[/{id}]    trigger definition CRUD
//! /api/v1/events[/{id}]      recorded trigger events (read-only)
//! ```

pub mod events;
pub mod health;
pub mod triggers;

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Assemble the application: routes plus the middleware stack (panic
/// recovery, request timeout, request-id propagation, trace spans, CORS).
pub fn app(state: AppState) -> Router {
    let request_id = HeaderName::from_static("x-request-id");

    let api_v1 = Router::new()
        .nest("/triggers", triggers::router())
        .nest("/events", events::router());

    Router::new()
        .merge(health::router())
        .nest("/api/v1", api_v1)
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(state.config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors_layer(&state.config))
        .with_state(state)
}

/// CORS for the configured origins. An unparseable origin aborts startup;
/// a misconfigured deployment should fail fast, not serve.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{origin}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
