//! HTTP client for the builder API.
//!
//! DESIGN
//! ======
//! `BuilderApi` is the seam between the builder session and the server: the
//! session only talks to the trait, so tests drive it with an in-memory mock.
//! `HttpBuilderApi` is the reqwest implementation. It authenticates with a
//! bearer session token and decodes the server's `{code, message}` envelope
//! on every non-2xx response.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::model::{
    Component, ComponentFilter, ComponentInstance, ErrorBody, InstancePatch, NewInstance, NewPage, NewProject, Page,
    Project, ReorderRequest, SessionResponse, User,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {} ({})", .body.message, .body.code)]
    Api { status: u16, body: ErrorBody },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status of an API error, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }

    /// Server-side `E_*` code carried by an API error.
    #[must_use]
    pub fn server_code(&self) -> Option<&str> {
        match self {
            Self::Api { body, .. } => Some(body.code.as_str()),
            _ => None,
        }
    }
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Api { .. } => "E_API",
            Self::Decode(_) => "E_DECODE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, body } => body.retryable || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Operations the builder session needs from the server.
#[async_trait::async_trait]
pub trait BuilderApi: Send + Sync {
    async fn list_components(&self, filter: &ComponentFilter) -> Result<Vec<Component>, ClientError>;

    async fn list_instances(&self, page_id: Uuid) -> Result<Vec<ComponentInstance>, ClientError>;

    async fn create_instance(&self, page_id: Uuid, body: &NewInstance) -> Result<ComponentInstance, ClientError>;

    async fn update_instance(&self, instance_id: Uuid, patch: &InstancePatch) -> Result<ComponentInstance, ClientError>;

    /// Rewrite one sibling group in a single request.
    async fn reorder_instances(
        &self,
        page_id: Uuid,
        request: &ReorderRequest,
    ) -> Result<Vec<ComponentInstance>, ClientError>;

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), ClientError>;
}

#[async_trait::async_trait]
impl<T: BuilderApi + ?Sized> BuilderApi for Arc<T> {
    async fn list_components(&self, filter: &ComponentFilter) -> Result<Vec<Component>, ClientError> {
        (**self).list_components(filter).await
    }

    async fn list_instances(&self, page_id: Uuid) -> Result<Vec<ComponentInstance>, ClientError> {
        (**self).list_instances(page_id).await
    }

    async fn create_instance(&self, page_id: Uuid, body: &NewInstance) -> Result<ComponentInstance, ClientError> {
        (**self).create_instance(page_id, body).await
    }

    async fn update_instance(&self, instance_id: Uuid, patch: &InstancePatch) -> Result<ComponentInstance, ClientError> {
        (**self).update_instance(instance_id, patch).await
    }

    async fn reorder_instances(
        &self,
        page_id: Uuid,
        request: &ReorderRequest,
    ) -> Result<Vec<ComponentInstance>, ClientError> {
        (**self).reorder_instances(page_id, request).await
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), ClientError> {
        (**self).delete_instance(instance_id).await
    }
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpBuilderApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBuilderApi {
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), token })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let text = send(builder).await?;
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send_with_body<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(self.request(method, path).json(body)).await
    }

    // -------------------------------------------------------------------------
    // Helpers outside the builder session
    // -------------------------------------------------------------------------

    /// `true` when `/healthz` answers 200.
    ///
    /// # Errors
    ///
    /// Returns `Transport` when the server cannot be reached.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self.request(Method::GET, "/healthz").send().await?;
        Ok(resp.status().is_success())
    }

    /// # Errors
    ///
    /// Returns `Api` with `E_DEV_LOGIN_DISABLED` when the server has dev login off.
    pub async fn dev_login(&self, email: &str, name: Option<&str>) -> Result<SessionResponse, ClientError> {
        let body = serde_json::json!({ "email": email, "name": name });
        self.send_with_body(Method::POST, "/api/auth/dev-login", &body).await
    }

    /// # Errors
    ///
    /// Returns `Api` with status 401 without a valid session.
    pub async fn me(&self) -> Result<User, ClientError> {
        self.send_json(self.request(Method::GET, "/api/auth/me")).await
    }

    /// # Errors
    ///
    /// Transport or API errors.
    pub async fn logout(&self) -> Result<(), ClientError> {
        send(self.request(Method::POST, "/api/auth/logout")).await.map(drop)
    }

    /// # Errors
    ///
    /// Transport or API errors.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.send_json(self.request(Method::GET, "/api/projects")).await
    }

    /// # Errors
    ///
    /// Transport or API errors.
    pub async fn create_project(&self, body: &NewProject) -> Result<Project, ClientError> {
        self.send_with_body(Method::POST, "/api/projects", body).await
    }

    /// # Errors
    ///
    /// Transport or API errors.
    pub async fn list_pages(&self, project_id: Uuid) -> Result<Vec<Page>, ClientError> {
        self.send_json(self.request(Method::GET, &format!("/api/projects/{project_id}/pages")))
            .await
    }

    /// # Errors
    ///
    /// Transport or API errors; `Api` 409 for a duplicate path.
    pub async fn create_page(&self, project_id: Uuid, body: &NewPage) -> Result<Page, ClientError> {
        self.send_with_body(Method::POST, &format!("/api/projects/{project_id}/pages"), body)
            .await
    }

    /// Rendered HTML document for a page.
    ///
    /// # Errors
    ///
    /// Transport or API errors.
    pub async fn render_page(&self, page_id: Uuid) -> Result<String, ClientError> {
        send(self.request(Method::GET, &format!("/api/pages/{page_id}/render"))).await
    }
}

/// Send and return the body text, or the decoded error envelope.
async fn send(builder: RequestBuilder) -> Result<String, ClientError> {
    let resp = builder.send().await?;
    let status = resp.status();
    let text = resp.text().await?;
    if status.is_success() {
        return Ok(text);
    }
    Err(ClientError::Api { status: status.as_u16(), body: parse_error_body(status.as_u16(), &text) })
}

/// Decode the server's error envelope, tolerating non-JSON bodies from proxies.
pub(crate) fn parse_error_body(status: u16, text: &str) -> ErrorBody {
    serde_json::from_str(text).unwrap_or_else(|_| ErrorBody {
        code: format!("E_HTTP_{status}"),
        message: if text.trim().is_empty() { format!("HTTP {status}") } else { text.trim().to_owned() },
        retryable: false,
    })
}

#[async_trait::async_trait]
impl BuilderApi for HttpBuilderApi {
    async fn list_components(&self, filter: &ComponentFilter) -> Result<Vec<Component>, ClientError> {
        self.send_json(self.request(Method::GET, "/api/components").query(filter))
            .await
    }

    async fn list_instances(&self, page_id: Uuid) -> Result<Vec<ComponentInstance>, ClientError> {
        self.send_json(self.request(Method::GET, &format!("/api/pages/{page_id}/instances")))
            .await
    }

    async fn create_instance(&self, page_id: Uuid, body: &NewInstance) -> Result<ComponentInstance, ClientError> {
        self.send_with_body(Method::POST, &format!("/api/pages/{page_id}/instances"), body)
            .await
    }

    async fn update_instance(&self, instance_id: Uuid, patch: &InstancePatch) -> Result<ComponentInstance, ClientError> {
        self.send_with_body(Method::PATCH, &format!("/api/instances/{instance_id}"), patch)
            .await
    }

    async fn reorder_instances(
        &self,
        page_id: Uuid,
        request: &ReorderRequest,
    ) -> Result<Vec<ComponentInstance>, ClientError> {
        self.send_with_body(Method::PUT, &format!("/api/pages/{page_id}/instances/order"), request)
            .await
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), ClientError> {
        send(self.request(Method::DELETE, &format!("/api/instances/{instance_id}")))
            .await
            .map(drop)
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
