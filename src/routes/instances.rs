//! Component instance routes: placement, property edits, reordering, and the
//! rendered page preview.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use uuid::Uuid;

use crate::model::{ComponentInstance, InstancePatch, NewInstance, ReorderRequest};
use crate::routes::auth::AuthUser;
use crate::routes::error::ApiError;
use crate::services::{instance, render};
use crate::state::AppState;

/// `GET /api/pages/{id}/instances` — ordered by parent, then `order_index`.
pub async fn list_instances(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
) -> Result<Json<Vec<ComponentInstance>>, ApiError> {
    Ok(Json(instance::list_page_instances(&state.pool, page_id, auth.user.id).await?))
}

/// `POST /api/pages/{id}/instances`
pub async fn create_instance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
    Json(body): Json<NewInstance>,
) -> Result<(StatusCode, Json<ComponentInstance>), ApiError> {
    let created = instance::create_instance(&state.pool, page_id, auth.user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /api/pages/{id}/instances/order` — rewrite one sibling group.
pub async fn reorder_instances(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<ComponentInstance>>, ApiError> {
    Ok(Json(instance::reorder_instances(&state.pool, page_id, auth.user.id, &request).await?))
}

/// `GET /api/pages/{id}/render`
pub async fn render_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
) -> Result<Html<String>, ApiError> {
    Ok(Html(render::render_page(&state.pool, page_id, auth.user.id).await?))
}

/// `GET /api/instances/{id}`
pub async fn get_instance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(instance_id): Path<Uuid>,
) -> Result<Json<ComponentInstance>, ApiError> {
    Ok(Json(instance::get_instance(&state.pool, instance_id, auth.user.id).await?))
}

/// `PATCH /api/instances/{id}`
pub async fn update_instance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(instance_id): Path<Uuid>,
    Json(patch): Json<InstancePatch>,
) -> Result<Json<ComponentInstance>, ApiError> {
    Ok(Json(instance::update_instance(&state.pool, instance_id, auth.user.id, &patch).await?))
}

/// `DELETE /api/instances/{id}` — children go with it.
pub async fn delete_instance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(instance_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    instance::delete_instance(&state.pool, instance_id, auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
