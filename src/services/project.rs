//! Project and page service: CRUD plus access checks.
//!
//! DESIGN
//! ======
//! A project belongs to one owner and holds pages. The owner may do anything;
//! other authenticated users may view public projects and nothing else.
//! Private projects are reported as missing to non-owners so their existence
//! does not leak. Every instance and component operation that targets a page
//! or project funnels through `ensure_page_permission` or
//! `ensure_project_permission`.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::model::{NewPage, NewProject, Page, PagePatch, Project, ProjectPatch, page_path_from_title};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    View,
    Edit,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project not found: {0}")]
    NotFound(Uuid),
    #[error("page not found: {0}")]
    PageNotFound(Uuid),
    #[error("not allowed to modify project {0}")]
    Forbidden(Uuid),
    #[error("a page with path {0} already exists in this project")]
    DuplicatePath(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for ProjectError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_PROJECT_NOT_FOUND",
            Self::PageNotFound(_) => "E_PAGE_NOT_FOUND",
            Self::Forbidden(_) => "E_PROJECT_FORBIDDEN",
            Self::DuplicatePath(_) => "E_DUPLICATE_PATH",
            Self::Invalid(_) => "E_INVALID_INPUT",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// =============================================================================
// ACCESS
// =============================================================================

/// Decide whether `user_id` may act on `project` with `permission`.
///
/// # Errors
///
/// `NotFound` when the project is private and not owned by the user,
/// `Forbidden` when it is public but the user wants to edit it.
pub fn check_access(project: &Project, user_id: Uuid, permission: Permission) -> Result<(), ProjectError> {
    if project.owner_id == user_id {
        return Ok(());
    }
    match (project.is_public, permission) {
        (true, Permission::View) => Ok(()),
        (true, Permission::Edit) => Err(ProjectError::Forbidden(project.id)),
        (false, _) => Err(ProjectError::NotFound(project.id)),
    }
}

/// Load a project and check access.
///
/// # Errors
///
/// `NotFound`, `Forbidden`, or a database error.
pub async fn ensure_project_permission(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    permission: Permission,
) -> Result<Project, ProjectError> {
    let project = load_project(pool, project_id)
        .await?
        .ok_or(ProjectError::NotFound(project_id))?;
    check_access(&project, user_id, permission)?;
    Ok(project)
}

/// Load a page and check access to its project.
///
/// # Errors
///
/// `PageNotFound` when the page is missing or its project is hidden from the
/// user, `Forbidden` for edits on a foreign public project, or a database
/// error.
pub async fn ensure_page_permission(
    pool: &PgPool,
    page_id: Uuid,
    user_id: Uuid,
    permission: Permission,
) -> Result<Page, ProjectError> {
    let row = sqlx::query(
        "SELECT pg.id, pg.project_id, pg.title, pg.path,
                p.owner_id, p.name, p.description, p.is_public
         FROM pages pg
         JOIN projects p ON p.id = pg.project_id
         WHERE pg.id = $1",
    )
    .bind(page_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ProjectError::PageNotFound(page_id))?;

    let page = page_from_row(&row);
    let project = Project {
        id: page.project_id,
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        is_public: row.get("is_public"),
    };
    check_access(&project, user_id, permission).map_err(|err| match err {
        ProjectError::NotFound(_) => ProjectError::PageNotFound(page_id),
        other => other,
    })?;
    Ok(page)
}

// =============================================================================
// VALIDATION
// =============================================================================

fn require_text(field: &str, value: &str) -> Result<String, ProjectError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProjectError::Invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

/// Normalize a user-supplied page path to a leading-slash form.
///
/// # Errors
///
/// `Invalid` when the path is empty or contains whitespace.
pub fn normalize_page_path(raw: &str) -> Result<String, ProjectError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProjectError::Invalid("path must not be empty".into()));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ProjectError::Invalid("path must not contain whitespace".into()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_owned())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

fn map_unique_path(err: sqlx::Error, path: &str) -> ProjectError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ProjectError::DuplicatePath(path.to_owned()),
        _ => ProjectError::Database(err),
    }
}

// =============================================================================
// PROJECTS
// =============================================================================

fn project_from_row(row: &PgRow) -> Project {
    Project {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        is_public: row.get("is_public"),
    }
}

async fn load_project(pool: &PgPool, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
    let row = sqlx::query("SELECT id, owner_id, name, description, is_public FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(project_from_row))
}

/// Projects owned by `user_id`, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_projects(pool: &PgPool, user_id: Uuid) -> Result<Vec<Project>, ProjectError> {
    let rows = sqlx::query(
        "SELECT id, owner_id, name, description, is_public
         FROM projects
         WHERE owner_id = $1
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(project_from_row).collect())
}

/// Create a project owned by `owner_id`.
///
/// # Errors
///
/// `Invalid` for a blank name, or a database error.
pub async fn create_project(pool: &PgPool, owner_id: Uuid, body: &NewProject) -> Result<Project, ProjectError> {
    let name = require_text("name", &body.name)?;
    let project = Project {
        id: Uuid::new_v4(),
        owner_id,
        name,
        description: body.description.clone(),
        is_public: body.is_public,
    };
    sqlx::query("INSERT INTO projects (id, owner_id, name, description, is_public) VALUES ($1, $2, $3, $4, $5)")
        .bind(project.id)
        .bind(project.owner_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.is_public)
        .execute(pool)
        .await?;
    info!(project_id = %project.id, %owner_id, "project created");
    Ok(project)
}

/// Fetch a project the user may view.
///
/// # Errors
///
/// `NotFound` or a database error.
pub async fn get_project(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<Project, ProjectError> {
    ensure_project_permission(pool, project_id, user_id, Permission::View).await
}

/// Apply a partial update to a project the user owns.
///
/// # Errors
///
/// `NotFound`, `Forbidden`, `Invalid`, or a database error.
pub async fn update_project(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    patch: &ProjectPatch,
) -> Result<Project, ProjectError> {
    let mut project = ensure_project_permission(pool, project_id, user_id, Permission::Edit).await?;
    if let Some(name) = &patch.name {
        project.name = require_text("name", name)?;
    }
    if let Some(description) = &patch.description {
        project.description.clone_from(description);
    }
    if let Some(is_public) = patch.is_public {
        project.is_public = is_public;
    }
    sqlx::query(
        "UPDATE projects SET name = $2, description = $3, is_public = $4, updated_at = now() WHERE id = $1",
    )
    .bind(project.id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.is_public)
    .execute(pool)
    .await?;
    Ok(project)
}

/// Delete a project and, by cascade, its pages and instances.
///
/// # Errors
///
/// `NotFound`, `Forbidden`, or a database error.
pub async fn delete_project(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<(), ProjectError> {
    ensure_project_permission(pool, project_id, user_id, Permission::Edit).await?;
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(pool)
        .await?;
    info!(%project_id, "project deleted");
    Ok(())
}

// =============================================================================
// PAGES
// =============================================================================

fn page_from_row(row: &PgRow) -> Page {
    Page {
        id: row.get("id"),
        project_id: row.get("project_id"),
        title: row.get("title"),
        path: row.get("path"),
    }
}

/// Pages of a project, ordered by path.
///
/// # Errors
///
/// `NotFound` or a database error.
pub async fn list_pages(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<Vec<Page>, ProjectError> {
    ensure_project_permission(pool, project_id, user_id, Permission::View).await?;
    let rows = sqlx::query("SELECT id, project_id, title, path FROM pages WHERE project_id = $1 ORDER BY path")
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(page_from_row).collect())
}

/// Create a page. The path is derived from the title when absent.
///
/// # Errors
///
/// `NotFound`, `Forbidden`, `Invalid`, `DuplicatePath`, or a database error.
pub async fn create_page(pool: &PgPool, project_id: Uuid, user_id: Uuid, body: &NewPage) -> Result<Page, ProjectError> {
    ensure_project_permission(pool, project_id, user_id, Permission::Edit).await?;
    let title = require_text("title", &body.title)?;
    let path = match &body.path {
        Some(path) => normalize_page_path(path)?,
        None => page_path_from_title(&title),
    };
    let page = Page { id: Uuid::new_v4(), project_id, title, path };
    sqlx::query("INSERT INTO pages (id, project_id, title, path) VALUES ($1, $2, $3, $4)")
        .bind(page.id)
        .bind(page.project_id)
        .bind(&page.title)
        .bind(&page.path)
        .execute(pool)
        .await
        .map_err(|err| map_unique_path(err, &page.path))?;
    info!(page_id = %page.id, %project_id, path = %page.path, "page created");
    Ok(page)
}

/// Fetch a page the user may view.
///
/// # Errors
///
/// `PageNotFound` or a database error.
pub async fn get_page(pool: &PgPool, page_id: Uuid, user_id: Uuid) -> Result<Page, ProjectError> {
    ensure_page_permission(pool, page_id, user_id, Permission::View).await
}

/// Rename or move a page.
///
/// # Errors
///
/// `PageNotFound`, `Forbidden`, `Invalid`, `DuplicatePath`, or a database error.
pub async fn update_page(pool: &PgPool, page_id: Uuid, user_id: Uuid, patch: &PagePatch) -> Result<Page, ProjectError> {
    let mut page = ensure_page_permission(pool, page_id, user_id, Permission::Edit).await?;
    if let Some(title) = &patch.title {
        page.title = require_text("title", title)?;
    }
    if let Some(path) = &patch.path {
        page.path = normalize_page_path(path)?;
    }
    sqlx::query("UPDATE pages SET title = $2, path = $3, updated_at = now() WHERE id = $1")
        .bind(page.id)
        .bind(&page.title)
        .bind(&page.path)
        .execute(pool)
        .await
        .map_err(|err| map_unique_path(err, &page.path))?;
    Ok(page)
}

/// Delete a page and, by cascade, its instances.
///
/// # Errors
///
/// `PageNotFound`, `Forbidden`, or a database error.
pub async fn delete_page(pool: &PgPool, page_id: Uuid, user_id: Uuid) -> Result<(), ProjectError> {
    ensure_page_permission(pool, page_id, user_id, Permission::Edit).await?;
    sqlx::query("DELETE FROM pages WHERE id = $1")
        .bind(page_id)
        .execute(pool)
        .await?;
    info!(%page_id, "page deleted");
    Ok(())
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
