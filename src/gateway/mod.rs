//! Gateway surface
//!
//! The judge admission endpoint, the WebSocket subscriber gateway and the
//! server management endpoints, all thin wrappers over the dispatcher and
//! the queue fabric.

pub mod handler;
pub mod request;
pub mod response;
pub mod subscriber;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Create all gateway routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/judge/{id}",
            post(handler::admit_judge).get(handler::judge_socket),
        )
        .route("/servers", get(handler::list_servers))
        .route("/server", post(handler::add_server))
        .route("/server/{id}/pause", post(handler::pause_server))
        .route("/server/{id}/resume", post(handler::resume_server))
        .route("/server/{id}/disconnect", post(handler::disconnect_server))
        .route("/server/{id}/reconnect", post(handler::reconnect_server))
        .route("/server/{id}", delete(handler::remove_server))
}
