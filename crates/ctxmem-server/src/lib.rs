//! HTTP surface and bus wiring for the context memory service. Builds the
//! axum router the binary serves and registers the consumers that drive
//! SOP-Abstraction and Space-Construction off `flush`'s published events.

mod bus;
mod error;
mod handlers;
mod state;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Builds the `/api/v1` router and registers the bus consumers against
/// `state.bus`. Call once at process startup, after the consumers are
/// registered messages already on the bus (if any) start flowing.
pub fn build_router(state: AppState) -> Router {
    bus::register(&state.bus, state.clone());

    Router::new()
        .nest("/api/v1", handlers::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
