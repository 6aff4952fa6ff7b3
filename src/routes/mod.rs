use std::sync::Arc;
use axum::{extract::DefaultBodyLimit, http::Method, routing::get, Router};
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use crate::AppState;

pub mod admin;
pub mod analyses;
pub mod identity;
pub mod uploads;
pub mod users;

// Room for multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    let body_limit = state.config.max_file_size + MULTIPART_OVERHEAD;

    let api = Router::new()
        .nest("/upload", uploads::routes())
        .nest("/analysis", analyses::routes())
        .nest("/admin", admin::routes())
        .nest("/users", users::routes());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
