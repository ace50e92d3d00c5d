use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::inference::ModelSlot;

pub mod handlers;
pub mod types;

use handlers::{chat, generate_d3, health};

#[derive(Clone)]
pub struct AppState {
    pub models: ModelSlot,
    /// Reported by /health while no model is installed.
    pub model_id: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate_d3", post(generate_d3))
        .route("/chat", post(chat))
        .route("/health", get(health))
}

/// Routes plus CORS and request tracing, bound to `state`.
pub fn app(state: AppState) -> Router {
    router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
