//! Page preview rendering.
//!
//! Loads a page's instances and the components they reference, builds the
//! render tree, and fills each component template. The result is a complete
//! HTML document for preview, not a published site.

use tracing::debug;
use uuid::Uuid;

use crate::builder::canvas::{build_tree, escape_html, render_html};
use crate::error::ErrorCode;
use crate::model::Page;
use crate::services::component::{self, ComponentError};
use crate::services::instance::{self, InstanceError};
use crate::services::project::{self, Permission, ProjectError};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
    #[error(transparent)]
    Component(#[from] ComponentError),
}

impl ErrorCode for RenderError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Project(err) => err.error_code(),
            Self::Instance(err) => err.error_code(),
            Self::Component(err) => err.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Project(err) => err.retryable(),
            Self::Instance(err) => err.retryable(),
            Self::Component(err) => err.retryable(),
        }
    }
}

/// Wrap rendered body HTML in a minimal document titled after the page.
#[must_use]
pub fn page_document(page: &Page, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body data-page-path=\"{}\">\n{body}\n</body>\n</html>\n",
        escape_html(&page.title),
        escape_html(&page.path),
    )
}

/// Render the page body HTML.
///
/// # Errors
///
/// Page permission or database errors.
pub async fn render_page_body(pool: &sqlx::PgPool, page_id: Uuid, user_id: Uuid) -> Result<(Page, String), RenderError> {
    let page = project::ensure_page_permission(pool, page_id, user_id, Permission::View).await?;
    let instances = instance::load_page_instances(pool, page_id).await?;

    let mut component_ids = instances.iter().map(|i| i.component_id).collect::<Vec<_>>();
    component_ids.sort_unstable();
    component_ids.dedup();
    let components = component::components_by_id(pool, &component_ids).await?;

    let tree = build_tree(&instances);
    debug!(%page_id, instances = instances.len(), components = components.len(), "rendering page");
    Ok((page, render_html(&tree, &components)))
}

/// Render the page as a full HTML document.
///
/// # Errors
///
/// Page permission or database errors.
pub async fn render_page(pool: &sqlx::PgPool, page_id: Uuid, user_id: Uuid) -> Result<String, RenderError> {
    let (page, body) = render_page_body(pool, page_id, user_id).await?;
    Ok(page_document(&page, &body))
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
