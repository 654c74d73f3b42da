//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the JSON API consumed by the builder client and the
//! CLI, plus the HTML page preview. Every `/api` route except dev login
//! requires an `AuthUser`.

pub mod auth;
pub mod components;
pub mod error;
pub mod instances;
pub mod projects;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/dev-login", post(auth::dev_login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/projects", get(projects::list_projects).post(projects::create_project))
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/api/projects/{id}/pages",
            get(projects::list_pages).post(projects::create_page),
        )
        .route(
            "/api/pages/{id}",
            get(projects::get_page)
                .patch(projects::update_page)
                .delete(projects::delete_page),
        )
        .route(
            "/api/pages/{id}/instances",
            get(instances::list_instances).post(instances::create_instance),
        )
        .route("/api/pages/{id}/instances/order", put(instances::reorder_instances))
        .route("/api/pages/{id}/render", get(instances::render_page))
        .route(
            "/api/components",
            get(components::list_components).post(components::create_component),
        )
        .route(
            "/api/components/{id}",
            get(components::get_component)
                .patch(components::update_component)
                .delete(components::delete_component),
        )
        .route(
            "/api/instances/{id}",
            get(instances::get_instance)
                .patch(instances::update_instance)
                .delete(instances::delete_instance),
        )
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
