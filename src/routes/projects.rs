//! Project and page routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::model::{NewPage, NewProject, Page, PagePatch, Project, ProjectPatch};
use crate::routes::auth::AuthUser;
use crate::routes::error::ApiError;
use crate::services::project;
use crate::state::AppState;

// =============================================================================
// PROJECTS
// =============================================================================

/// `GET /api/projects` — projects owned by the caller.
pub async fn list_projects(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = project::list_projects(&state.pool, auth.user.id).await?;
    Ok(Json(projects))
}

/// `POST /api/projects`
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let created = project::create_project(&state.pool, auth.user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/projects/{id}`
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(project::get_project(&state.pool, project_id, auth.user.id).await?))
}

/// `PATCH /api/projects/{id}`
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(project::update_project(&state.pool, project_id, auth.user.id, &patch).await?))
}

/// `DELETE /api/projects/{id}` — removes pages and instances with it.
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    project::delete_project(&state.pool, project_id, auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PAGES
// =============================================================================

/// `GET /api/projects/{id}/pages`
pub async fn list_pages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Page>>, ApiError> {
    Ok(Json(project::list_pages(&state.pool, project_id, auth.user.id).await?))
}

/// `POST /api/projects/{id}/pages` — path defaults to a slug of the title.
pub async fn create_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<NewPage>,
) -> Result<(StatusCode, Json<Page>), ApiError> {
    let page = project::create_page(&state.pool, project_id, auth.user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

/// `GET /api/pages/{id}`
pub async fn get_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
) -> Result<Json<Page>, ApiError> {
    Ok(Json(project::get_page(&state.pool, page_id, auth.user.id).await?))
}

/// `PATCH /api/pages/{id}`
pub async fn update_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
    Json(patch): Json<PagePatch>,
) -> Result<Json<Page>, ApiError> {
    Ok(Json(project::update_page(&state.pool, page_id, auth.user.id, &patch).await?))
}

/// `DELETE /api/pages/{id}`
pub async fn delete_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    project::delete_page(&state.pool, page_id, auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
