//! Component library service.
//!
//! DESIGN
//! ======
//! Component definitions are either global (seeded by the server, read-only
//! through the API) or scoped to a project. A user sees every global
//! component plus the components of projects they own. Project-scoped
//! components can be edited and deleted only by the project owner, and a
//! component still referenced by instances cannot be deleted.

use std::collections::HashMap;

use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use crate::model::{Component, ComponentFilter, ComponentPatch, NewComponent};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("component not found: {0}")]
    NotFound(Uuid),
    #[error("access denied to component {0}")]
    Forbidden(Uuid),
    #[error("global component {0} cannot be modified")]
    GlobalReadOnly(Uuid),
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),
    #[error("component {id} is used by {count} instance(s)")]
    InUse { id: Uuid, count: i64 },
    #[error("invalid component: {0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for ComponentError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_COMPONENT_NOT_FOUND",
            Self::Forbidden(_) => "E_COMPONENT_FORBIDDEN",
            Self::GlobalReadOnly(_) => "E_COMPONENT_READ_ONLY",
            Self::ProjectNotFound(_) => "E_PROJECT_NOT_FOUND",
            Self::InUse { .. } => "E_COMPONENT_IN_USE",
            Self::Invalid(_) => "E_INVALID_INPUT",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

const COMPONENT_COLUMNS: &str = "id, name, display_name, component_type, category, description, schema, \
                                 default_props, template, project_id, is_global, is_published";

fn component_from_row(row: &PgRow) -> Component {
    Component {
        id: row.get("id"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        component_type: row.get("component_type"),
        category: row.get("category"),
        description: row.get("description"),
        schema: row.get("schema"),
        default_props: row.get("default_props"),
        template: row.get("template"),
        project_id: row.get("project_id"),
        is_global: row.get("is_global"),
        is_published: row.get("is_published"),
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Check the shape of a component definition before it is stored.
///
/// # Errors
///
/// `Invalid` for a blank name, a non-object schema or default props, or a
/// `properties` entry that is not an object.
pub fn validate_definition(name: &str, schema: &serde_json::Value, default_props: &serde_json::Value) -> Result<(), ComponentError> {
    if name.trim().is_empty() {
        return Err(ComponentError::Invalid("name must not be empty".into()));
    }
    if !schema.is_object() {
        return Err(ComponentError::Invalid("schema must be a JSON object".into()));
    }
    if let Some(properties) = schema.get("properties") {
        if !properties.is_object() {
            return Err(ComponentError::Invalid("schema.properties must be a JSON object".into()));
        }
    }
    if !default_props.is_object() {
        return Err(ComponentError::Invalid("default_props must be a JSON object".into()));
    }
    Ok(())
}

/// Global components are never editable through the API.
///
/// # Errors
///
/// `GlobalReadOnly` for global or unscoped components.
pub fn editable_project(component: &Component) -> Result<Uuid, ComponentError> {
    match component.project_id {
        Some(project_id) if !component.is_global => Ok(project_id),
        _ => Err(ComponentError::GlobalReadOnly(component.id)),
    }
}

async fn owns_project(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM projects WHERE id = $1 AND owner_id = $2")
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn load_component(pool: &PgPool, component_id: Uuid) -> Result<Component, ComponentError> {
    let row = sqlx::query(&format!("SELECT {COMPONENT_COLUMNS} FROM components WHERE id = $1"))
        .bind(component_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ComponentError::NotFound(component_id))?;
    Ok(component_from_row(&row))
}

// =============================================================================
// QUERIES
// =============================================================================

/// Components visible to `user_id`, narrowed by `filter`.
///
/// # Errors
///
/// `ProjectNotFound` when filtering by a project the user does not own.
pub async fn list_components(
    pool: &PgPool,
    user_id: Uuid,
    filter: &ComponentFilter,
) -> Result<Vec<Component>, ComponentError> {
    if let Some(project_id) = filter.project_id {
        if !owns_project(pool, project_id, user_id).await? {
            return Err(ComponentError::ProjectNotFound(project_id));
        }
    }

    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
        "SELECT {COMPONENT_COLUMNS} FROM components
         WHERE (is_global OR project_id IN (SELECT id FROM projects WHERE owner_id = "
    ));
    builder.push_bind(user_id);
    builder.push("))");
    if let Some(project_id) = filter.project_id {
        builder.push(" AND project_id = ").push_bind(project_id);
    }
    if let Some(is_global) = filter.is_global {
        builder.push(" AND is_global = ").push_bind(is_global);
    }
    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    builder.push(" ORDER BY is_global DESC, category, name");

    let rows = builder.build().fetch_all(pool).await?;
    Ok(rows.iter().map(component_from_row).collect())
}

/// Fetch one component the user may see.
///
/// # Errors
///
/// `NotFound`, or `Forbidden` for another user's project component.
pub async fn get_component(pool: &PgPool, component_id: Uuid, user_id: Uuid) -> Result<Component, ComponentError> {
    let component = load_component(pool, component_id).await?;
    if !component.is_global {
        if let Some(project_id) = component.project_id {
            if !owns_project(pool, project_id, user_id).await? {
                return Err(ComponentError::Forbidden(component_id));
            }
        }
    }
    Ok(component)
}

/// Load the given components keyed by id. Missing ids are skipped.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn components_by_id(pool: &PgPool, ids: &[Uuid]) -> Result<HashMap<Uuid, Component>, ComponentError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query(&format!("SELECT {COMPONENT_COLUMNS} FROM components WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(component_from_row)
        .map(|component| (component.id, component))
        .collect())
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Create a project-scoped component.
///
/// # Errors
///
/// `Invalid` for bad definitions or missing project scope, `ProjectNotFound`
/// when the user does not own the target project.
pub async fn create_component(pool: &PgPool, user_id: Uuid, body: &NewComponent) -> Result<Component, ComponentError> {
    validate_definition(&body.name, &body.schema, &body.default_props)?;
    if body.is_global {
        return Err(ComponentError::Invalid("global components are managed by the server".into()));
    }
    let Some(project_id) = body.project_id else {
        return Err(ComponentError::Invalid("project_id is required".into()));
    };
    if !owns_project(pool, project_id, user_id).await? {
        return Err(ComponentError::ProjectNotFound(project_id));
    }

    let component = insert_component(pool, body).await?;
    info!(component_id = %component.id, %project_id, name = %component.name, "component created");
    Ok(component)
}

async fn insert_component(pool: &PgPool, body: &NewComponent) -> Result<Component, sqlx::Error> {
    let component = Component {
        id: Uuid::new_v4(),
        name: body.name.trim().to_owned(),
        display_name: body.display_name.clone(),
        component_type: body.component_type.clone(),
        category: body.category.clone(),
        description: body.description.clone(),
        schema: body.schema.clone(),
        default_props: body.default_props.clone(),
        template: body.template.clone(),
        project_id: body.project_id,
        is_global: body.is_global,
        is_published: body.is_published,
    };
    sqlx::query(&format!(
        "INSERT INTO components ({COMPONENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(component.id)
    .bind(&component.name)
    .bind(&component.display_name)
    .bind(&component.component_type)
    .bind(&component.category)
    .bind(&component.description)
    .bind(&component.schema)
    .bind(&component.default_props)
    .bind(&component.template)
    .bind(component.project_id)
    .bind(component.is_global)
    .bind(component.is_published)
    .execute(pool)
    .await?;
    Ok(component)
}

/// Apply a partial update to a project component the user owns.
///
/// # Errors
///
/// `NotFound`, `GlobalReadOnly`, `Forbidden`, `Invalid`, or a database error.
pub async fn update_component(
    pool: &PgPool,
    component_id: Uuid,
    user_id: Uuid,
    patch: &ComponentPatch,
) -> Result<Component, ComponentError> {
    let mut component = load_component(pool, component_id).await?;
    let project_id = editable_project(&component)?;
    if !owns_project(pool, project_id, user_id).await? {
        return Err(ComponentError::Forbidden(component_id));
    }

    apply_patch(&mut component, patch);
    validate_definition(&component.name, &component.schema, &component.default_props)?;

    sqlx::query(
        "UPDATE components
         SET name = $2, display_name = $3, component_type = $4, category = $5, description = $6,
             schema = $7, default_props = $8, template = $9, is_published = $10, updated_at = now()
         WHERE id = $1",
    )
    .bind(component.id)
    .bind(&component.name)
    .bind(&component.display_name)
    .bind(&component.component_type)
    .bind(&component.category)
    .bind(&component.description)
    .bind(&component.schema)
    .bind(&component.default_props)
    .bind(&component.template)
    .bind(component.is_published)
    .execute(pool)
    .await?;
    Ok(component)
}

/// Merge present patch fields into `component`.
pub fn apply_patch(component: &mut Component, patch: &ComponentPatch) {
    if let Some(name) = &patch.name {
        name.trim().clone_into(&mut component.name);
    }
    if let Some(display_name) = &patch.display_name {
        component.display_name.clone_from(display_name);
    }
    if let Some(component_type) = &patch.component_type {
        component.component_type.clone_from(component_type);
    }
    if let Some(category) = &patch.category {
        component.category.clone_from(category);
    }
    if let Some(description) = &patch.description {
        component.description.clone_from(description);
    }
    if let Some(schema) = &patch.schema {
        component.schema.clone_from(schema);
    }
    if let Some(default_props) = &patch.default_props {
        component.default_props.clone_from(default_props);
    }
    if let Some(template) = &patch.template {
        component.template.clone_from(template);
    }
    if let Some(is_published) = patch.is_published {
        component.is_published = is_published;
    }
}

/// Delete a project component that no instance references.
///
/// # Errors
///
/// `NotFound`, `GlobalReadOnly`, `Forbidden`, `InUse`, or a database error.
pub async fn delete_component(pool: &PgPool, component_id: Uuid, user_id: Uuid) -> Result<(), ComponentError> {
    let component = load_component(pool, component_id).await?;
    let project_id = editable_project(&component)?;
    if !owns_project(pool, project_id, user_id).await? {
        return Err(ComponentError::Forbidden(component_id));
    }

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM component_instances WHERE component_id = $1")
        .bind(component_id)
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Err(ComponentError::InUse { id: component_id, count });
    }

    let result = sqlx::query("DELETE FROM components WHERE id = $1")
        .bind(component_id)
        .execute(pool)
        .await;
    match result {
        Ok(_) => {
            info!(%component_id, "component deleted");
            Ok(())
        }
        Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
            Err(ComponentError::InUse { id: component_id, count: 1 })
        }
        Err(err) => Err(err.into()),
    }
}

// =============================================================================
// SEEDING
// =============================================================================

/// The built-in global component library.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn default_components() -> Vec<NewComponent> {
    let global = |name: &str, component_type: &str, category: &str, description: &str| NewComponent {
        name: name.to_owned(),
        display_name: None,
        component_type: component_type.to_owned(),
        category: category.to_owned(),
        description: Some(description.to_owned()),
        schema: json!({}),
        default_props: json!({}),
        template: None,
        project_id: None,
        is_global: true,
        is_published: true,
    };

    vec![
        NewComponent {
            schema: json!({
                "properties": {
                    "content": {"type": "string", "title": "Content"},
                    "fontSize": {"type": "string", "title": "Font Size", "enum": ["sm", "md", "lg", "xl"]},
                    "color": {"type": "string", "title": "Text Color"},
                    "alignment": {"type": "string", "title": "Alignment", "enum": ["left", "center", "right"]}
                },
                "required": ["content"]
            }),
            default_props: json!({
                "content": "Enter your text here",
                "fontSize": "md",
                "color": "#000000",
                "alignment": "left"
            }),
            template: Some(
                r#"<div style="text-align: {alignment}; color: {color}; font-size: {fontSize};">{content}</div>"#.into(),
            ),
            ..global("Text Block", "text", "basic", "A simple text block with customizable content")
        },
        NewComponent {
            schema: json!({
                "properties": {
                    "text": {"type": "string", "title": "Button Text"},
                    "variant": {"type": "string", "title": "Variant", "enum": ["primary", "secondary", "outline"]},
                    "size": {"type": "string", "title": "Size", "enum": ["sm", "md", "lg"]},
                    "onClick": {"type": "string", "title": "Click Action"}
                },
                "required": ["text"]
            }),
            default_props: json!({"text": "Click me", "variant": "primary", "size": "md", "onClick": ""}),
            template: Some(r#"<button class="btn btn-{variant} btn-{size}" onclick="{onClick}">{text}</button>"#.into()),
            ..global("Button", "button", "basic", "Customizable button component")
        },
        NewComponent {
            schema: json!({
                "properties": {
                    "src": {"type": "string", "title": "Image URL"},
                    "alt": {"type": "string", "title": "Alt Text"},
                    "width": {"type": "string", "title": "Width"},
                    "height": {"type": "string", "title": "Height"}
                },
                "required": ["src", "alt"]
            }),
            default_props: json!({
                "src": "https://via.placeholder.com/300x200",
                "alt": "Placeholder image",
                "width": "300px",
                "height": "200px"
            }),
            template: Some(r#"<img src="{src}" alt="{alt}" style="width: {width}; height: {height};" />"#.into()),
            ..global("Image", "image", "media", "Image component with customizable source and alt text")
        },
        NewComponent {
            schema: json!({
                "properties": {
                    "padding": {"type": "string", "title": "Padding"},
                    "margin": {"type": "string", "title": "Margin"},
                    "backgroundColor": {"type": "string", "title": "Background Color"},
                    "flexDirection": {"type": "string", "title": "Flex Direction", "enum": ["row", "column"]}
                }
            }),
            default_props: json!({
                "padding": "16px",
                "margin": "0px",
                "backgroundColor": "transparent",
                "flexDirection": "column"
            }),
            template: Some(
                r#"<div style="padding: {padding}; margin: {margin}; background-color: {backgroundColor}; display: flex; flex-direction: {flexDirection};">{children}</div>"#
                    .into(),
            ),
            ..global("Container", "layout", "layout", "Container for grouping other components")
        },
        NewComponent {
            schema: json!({
                "properties": {
                    "label": {"type": "string", "title": "Label"},
                    "placeholder": {"type": "string", "title": "Placeholder"},
                    "type": {"type": "string", "title": "Input Type", "enum": ["text", "email", "password", "number"]},
                    "required": {"type": "boolean", "title": "Required"}
                },
                "required": ["label"]
            }),
            default_props: json!({
                "label": "Input Label",
                "placeholder": "Enter value...",
                "type": "text",
                "required": false
            }),
            template: Some(
                r#"<div class="form-field"><label>{label}</label><input type="{type}" placeholder="{placeholder}" required="{required}" /></div>"#
                    .into(),
            ),
            ..global("Form Input", "form", "form", "Input field for forms")
        },
    ]
}

/// Insert the built-in library when no global component exists yet.
/// Returns the number of components inserted.
///
/// # Errors
///
/// Returns a database error if the count or inserts fail.
pub async fn seed_components_if_empty(pool: &PgPool) -> Result<usize, ComponentError> {
    let existing: i64 = sqlx::query_scalar("SELECT count(*) FROM components WHERE is_global")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(0);
    }
    seed_default_components(pool).await
}

/// Insert every built-in component whose name is not already taken by a
/// global component. Returns the number inserted.
///
/// # Errors
///
/// Returns a database error if an insert fails.
pub async fn seed_default_components(pool: &PgPool) -> Result<usize, ComponentError> {
    let mut inserted = 0;
    for body in default_components() {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM components WHERE is_global AND name = $1)")
            .bind(&body.name)
            .fetch_one(pool)
            .await?;
        if taken {
            continue;
        }
        insert_component(pool, &body).await?;
        inserted += 1;
    }
    info!(inserted, "default components seeded");
    Ok(inserted)
}

#[cfg(test)]
#[path = "component_test.rs"]
mod tests;
