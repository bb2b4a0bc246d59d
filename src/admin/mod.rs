//! Admin API.
//!
//! Read-only views of every client's servers, statistics and zones, plus
//! manual mark-down / mark-up. Every route requires the bearer API key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::registry::ClientRegistry;

/// State shared by admin handlers.
#[derive(Debug, Clone)]
pub struct AdminState {
    pub registry: Arc<ClientRegistry>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(registry: Arc<ClientRegistry>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/clients", get(list_clients))
        .route("/admin/clients/{name}/servers", get(get_servers))
        .route("/admin/clients/{name}/stats", get(get_stats))
        .route("/admin/clients/{name}/zones", get(get_zones))
        .route("/admin/clients/{name}/servers/{id}/down", post(mark_down))
        .route("/admin/clients/{name}/servers/{id}/up", post(mark_up))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
