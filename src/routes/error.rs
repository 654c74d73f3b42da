//! HTTP error envelope.
//!
//! Every handler error becomes `(status, {"code", "message", "retryable"})`.
//! Service errors map to a status here; server-side failures are logged and
//! reported with a generic message so database details never reach clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::error::ErrorCode;
use crate::model::ErrorBody;
use crate::services::component::ComponentError;
use crate::services::instance::InstanceError;
use crate::services::project::ProjectError;
use crate::services::render::RenderError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, err: &(impl ErrorCode + ?Sized)) -> Self {
        let message = if status.is_server_error() {
            tracing::error!(code = err.error_code(), error = %err, "request failed");
            "internal server error".to_owned()
        } else {
            err.to_string()
        };
        Self {
            status,
            body: ErrorBody { code: err.error_code().to_owned(), message, retryable: err.retryable() },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// =============================================================================
// STATUS MAPPING
// =============================================================================

pub(crate) fn project_error_to_status(err: &ProjectError) -> StatusCode {
    match err {
        ProjectError::NotFound(_) | ProjectError::PageNotFound(_) => StatusCode::NOT_FOUND,
        ProjectError::Forbidden(_) => StatusCode::FORBIDDEN,
        ProjectError::DuplicatePath(_) => StatusCode::CONFLICT,
        ProjectError::Invalid(_) => StatusCode::BAD_REQUEST,
        ProjectError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn component_error_to_status(err: &ComponentError) -> StatusCode {
    match err {
        ComponentError::NotFound(_) | ComponentError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        ComponentError::Forbidden(_) | ComponentError::GlobalReadOnly(_) => StatusCode::FORBIDDEN,
        ComponentError::InUse { .. } => StatusCode::CONFLICT,
        ComponentError::Invalid(_) => StatusCode::BAD_REQUEST,
        ComponentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn instance_error_to_status(err: &InstanceError) -> StatusCode {
    match err {
        InstanceError::NotFound(_) | InstanceError::ComponentNotFound(_) => StatusCode::NOT_FOUND,
        InstanceError::InvalidParent(_) | InstanceError::Invalid(_) => StatusCode::BAD_REQUEST,
        InstanceError::SiblingMismatch { .. } | InstanceError::StaleUpdate { .. } => StatusCode::CONFLICT,
        InstanceError::Project(inner) => project_error_to_status(inner),
        InstanceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn render_error_to_status(err: &RenderError) -> StatusCode {
    match err {
        RenderError::Project(inner) => project_error_to_status(inner),
        RenderError::Instance(inner) => instance_error_to_status(inner),
        RenderError::Component(inner) => component_error_to_status(inner),
    }
}

impl From<ProjectError> for ApiError {
    fn from(err: ProjectError) -> Self {
        Self::new(project_error_to_status(&err), &err)
    }
}

impl From<ComponentError> for ApiError {
    fn from(err: ComponentError) -> Self {
        Self::new(component_error_to_status(&err), &err)
    }
}

impl From<InstanceError> for ApiError {
    fn from(err: InstanceError) -> Self {
        Self::new(instance_error_to_status(&err), &err)
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        Self::new(render_error_to_status(&err), &err)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
