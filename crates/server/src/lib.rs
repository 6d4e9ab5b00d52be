pub mod config;
pub mod error;
pub mod routes;
pub mod store;

use std::sync::Arc;

use axum::{routing::{get, post}, Extension, Router};
use tower_http::cors::{Any, CorsLayer};

use store::SessionStore;

/// All HTTP routes over a shared session store
pub fn router(store: Arc<SessionStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/sessions", post(routes::sessions::create_session))
        .route(
            "/api/sessions/{id}",
            get(routes::sessions::get_session).delete(routes::sessions::delete_session),
        )
        .route("/api/sessions/{id}/new-game", post(routes::sessions::new_game))
        .route("/api/sessions/{id}/move", post(routes::sessions::make_move))
        .route("/api/sessions/{id}/undo", post(routes::sessions::undo))
        .route("/api/sessions/{id}/status", get(routes::sessions::get_status))
        .route("/api/sessions/{id}/analysis", get(routes::sessions::get_analysis))
        .route("/api/sessions/{id}/ask", post(routes::sessions::ask_tutor))
        .layer(Extension(store))
        .layer(cors)
}
