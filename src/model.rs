//! Wire and storage types shared by the server, the builder logic, and the
//! HTTP client.
//!
//! DESIGN
//! ======
//! Every type here round-trips through JSON with snake_case field names.
//! Component definitions are reference data; component instances are the
//! mutable placements that the builder creates, reorders, and edits.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_component_type() -> String {
    "custom".to_owned()
}

fn default_category() -> String {
    "custom".to_owned()
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// =============================================================================
// USERS / PROJECTS / PAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPage {
    pub title: String,
    /// URL path inside the project. Derived from the title when absent.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Turn a page title into a `/lower-kebab` path.
#[must_use]
pub fn page_path_from_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len() + 1);
    slug.push('/');
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && slug.len() > 1 {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// =============================================================================
// COMPONENT DEFINITIONS
// =============================================================================

/// A reusable component definition listed in the builder's library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_component_type")]
    pub component_type: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-schema-like property description: `{"properties": {...}, "required": [...]}`.
    #[serde(default = "empty_object", alias = "component_schema")]
    pub schema: serde_json::Value,
    #[serde(default = "empty_object")]
    pub default_props: serde_json::Value,
    /// HTML template with `{prop}` placeholders and an optional `{children}` slot.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub is_published: bool,
}

impl Component {
    /// Name shown in the library: display name when set, otherwise the name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComponent {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_component_type")]
    pub component_type: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object", alias = "component_schema")]
    pub schema: serde_json::Value,
    #[serde(default = "empty_object")]
    pub default_props: serde_json::Value,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, alias = "component_schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_props: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub template: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

/// Query filters for the component library listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_global: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// =============================================================================
// COMPONENT INSTANCES
// =============================================================================

/// Layout hints carried by an instance. The builder never interprets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// A placed, configured occurrence of a component on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub id: Uuid,
    pub component_id: Uuid,
    pub page_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default = "empty_object")]
    pub props: serde_json::Value,
    pub order_index: i32,
    #[serde(flatten)]
    pub layout: Layout,
    #[serde(default = "initial_version")]
    pub version: i32,
}

fn initial_version() -> i32 {
    1
}

/// Body of an instance create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstance {
    pub component_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Initial props. The component's `default_props` are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,
    /// Sibling position. Appends to the end of the sibling group when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
    #[serde(flatten)]
    pub layout: Layout,
}

/// Partial instance update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstancePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,
    /// `Some(None)` moves the instance to the page root.
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    /// Reject the update as stale if the stored version is newer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i32>,
}

/// Full new ordering of one sibling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub ordered_ids: Vec<Uuid>,
}

// =============================================================================
// ENVELOPES
// =============================================================================

/// JSON body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

/// Response to a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
