//! Component library routes.
//!
//! Listing accepts `?project_id=…&is_global=…&category=…`. Global
//! components are read-only over the API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::model::{Component, ComponentFilter, ComponentPatch, NewComponent};
use crate::routes::auth::AuthUser;
use crate::routes::error::ApiError;
use crate::services::component;
use crate::state::AppState;

/// `GET /api/components`
pub async fn list_components(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ComponentFilter>,
) -> Result<Json<Vec<Component>>, ApiError> {
    Ok(Json(component::list_components(&state.pool, auth.user.id, &filter).await?))
}

/// `POST /api/components` — project-scoped definition.
pub async fn create_component(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewComponent>,
) -> Result<(StatusCode, Json<Component>), ApiError> {
    let created = component::create_component(&state.pool, auth.user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/components/{id}`
pub async fn get_component(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(component_id): Path<Uuid>,
) -> Result<Json<Component>, ApiError> {
    Ok(Json(component::get_component(&state.pool, component_id, auth.user.id).await?))
}

/// `PATCH /api/components/{id}`
pub async fn update_component(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(component_id): Path<Uuid>,
    Json(patch): Json<ComponentPatch>,
) -> Result<Json<Component>, ApiError> {
    Ok(Json(component::update_component(&state.pool, component_id, auth.user.id, &patch).await?))
}

/// `DELETE /api/components/{id}` — 409 while instances still use it.
pub async fn delete_component(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(component_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    component::delete_component(&state.pool, component_id, auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
