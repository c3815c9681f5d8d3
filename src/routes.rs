// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{comments, moderation},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, optional_auth_middleware},
};

/// Assembles the main application router.
///
/// * Thread reads accept anonymous viewers.
/// * Writes require a valid token; moderation additionally requires the admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let public_routes = Router::new()
        .route("/targets/{target_id}/comments", get(comments::get_thread))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let viewer_routes = Router::new()
        .route("/targets/{target_id}/comments", post(comments::create_comment))
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/comments/{id}/vote", post(comments::vote_comment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/comments", get(moderation::list_comments))
        .route("/comments/{id}", delete(moderation::delete_comment))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", public_routes.merge(viewer_routes))
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
