pub mod health;
pub mod models;
pub mod stream;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub use models::fetch_available_models;

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/v1/models", get(models::handler))
        .route("/v1/stream", post(stream::handler))
        .with_state(state)
}
