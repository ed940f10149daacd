// src/routes.rs
use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use crate::handlers;
use crate::state::AppState;

const AUTH_TOKEN_HEADER: header::HeaderName = header::HeaderName::from_static("x-auth-token");

/// Permissive CORS. Any `OPTIONS` request is answered here with an empty 200.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            USER_ID_HEADER,
            USER_ROLE_HEADER,
            AUTH_TOKEN_HEADER,
        ])
        .max_age(Duration::from_secs(86_400))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/api",
            Router::new()
                .route(
                    "/auth",
                    post(handlers::authenticate).fallback(handlers::method_not_allowed),
                )
                .route(
                    "/polls",
                    get(handlers::list_polls)
                        .post(handlers::vote)
                        .fallback(handlers::method_not_allowed),
                )
                .route(
                    "/manage-polls",
                    post(handlers::create_poll)
                        .put(handlers::update_poll_status)
                        .delete(handlers::delete_poll)
                        .fallback(handlers::method_not_allowed),
                ),
        )
        .fallback(handlers::not_found)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
