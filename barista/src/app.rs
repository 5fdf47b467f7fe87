//! Assembling the drinks router

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, Method},
    routing::{get, patch},
    Router,
};
use barista_auth::AuthGate;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, store::DrinkStore};

/// Everything the handlers share
#[derive(Clone, Debug)]
pub struct AppState {
    gate: AuthGate,
    store: Arc<dyn DrinkStore>,
}

impl AppState {
    /// Bundles the gate for protected routes with the drink store
    pub fn new(gate: AuthGate, store: impl DrinkStore + 'static) -> Self {
        Self {
            gate,
            store: Arc::new(store),
        }
    }

    /// The gate authorizing protected routes
    #[must_use]
    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// The drink store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DrinkStore> {
        &self.store
    }
}

impl FromRef<AppState> for AuthGate {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

impl FromRef<AppState> for Arc<dyn DrinkStore> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.store)
    }
}

/// Builds the drinks router, with CORS and request tracing applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/drinks",
            get(routes::list_drinks).post(routes::create_drink),
        )
        .route("/drinks-detail", get(routes::list_drinks_detail))
        .route(
            "/drinks/:id",
            patch(routes::update_drink).delete(routes::delete_drink),
        )
        .fallback(routes::not_found)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
}
