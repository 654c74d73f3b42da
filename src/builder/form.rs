//! Property panel forms derived from component schemas.
//!
//! DESIGN
//! ======
//! A component's `schema` lists its editable properties as
//! `{"properties": {key: {"type", "title", "enum", "default"}}, "required": [...]}`.
//! The panel shows one field per property and submits the entire props object
//! in a single update. Values arrive as raw strings from the input widgets and
//! are coerced by field kind before submission.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::builder::canvas::resolve_props;
use crate::model::{Component, ComponentInstance};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "options", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Checkbox,
    /// Schema `enum` values, kept with their JSON types.
    Select(Vec<Value>),
    Color,
    /// Free-form JSON for arrays, objects, and untyped properties.
    Textarea,
}

impl FieldKind {
    /// HTML input type (or element name) used to edit this kind.
    #[must_use]
    pub fn input_type(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Select(_) => "select",
            Self::Color => "color",
            Self::Textarea => "textarea",
        }
    }
}

/// Text shown for one select option; also the raw value a form submits.
#[must_use]
pub fn option_label(option: &Value) -> String {
    match option {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub value: Option<Value>,
}

impl FormField {
    /// Current value as the string an input widget would display.
    #[must_use]
    pub fn display_value(&self) -> String {
        match &self.value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(value @ (Value::Array(_) | Value::Object(_))) if self.kind == FieldKind::Textarea => {
                serde_json::to_string_pretty(value).unwrap_or_default()
            }
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("{key}: {message}")]
pub struct FieldError {
    pub key: String,
    pub message: String,
}

impl FieldError {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self { key: key.to_owned(), message: message.into() }
    }
}

/// The editable form for one selected instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyForm {
    pub instance_id: Uuid,
    pub component_id: Uuid,
    pub title: String,
    pub fields: Vec<FormField>,
    /// Props the submission starts from; keys without a field are preserved.
    base: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PanelState {
    /// Nothing selected; the panel shows a placeholder.
    Empty,
    Editing(PropertyForm),
}

// =============================================================================
// DERIVATION
// =============================================================================

/// Build the property form for `instance` from its component's schema.
#[must_use]
pub fn derive_form(component: &Component, instance: &ComponentInstance) -> PropertyForm {
    let base = resolve_props(component, instance);
    let required = component
        .schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    let fields = component
        .schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(key, property)| FormField {
                    key: key.clone(),
                    label: property
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or(key)
                        .to_owned(),
                    kind: field_kind(key, property),
                    required: required.contains(&key.as_str()),
                    value: base.get(key).cloned().or_else(|| property.get("default").cloned()),
                })
                .collect()
        })
        .unwrap_or_default();

    PropertyForm {
        instance_id: instance.id,
        component_id: component.id,
        title: component.label().to_owned(),
        fields,
        base,
    }
}

/// Widget kind for one schema property. `enum` wins over the declared type.
#[must_use]
pub fn field_kind(key: &str, property: &Value) -> FieldKind {
    if let Some(options) = property.get("enum").and_then(Value::as_array) {
        return FieldKind::Select(options.clone());
    }
    match property.get("type").and_then(Value::as_str) {
        Some("string") if key.to_ascii_lowercase().contains("color") => FieldKind::Color,
        Some("string") => FieldKind::Text,
        Some("number" | "integer") => FieldKind::Number,
        Some("boolean") => FieldKind::Checkbox,
        _ => FieldKind::Textarea,
    }
}

// =============================================================================
// SUBMISSION
// =============================================================================

impl PropertyForm {
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.key == key)
    }

    /// Coerce raw input values and produce the complete props object.
    ///
    /// Fields missing from `values` keep their current value. Keys in
    /// `values` without a matching field are ignored.
    ///
    /// # Errors
    ///
    /// Every field that fails coercion or a required check, in field order.
    pub fn apply(&self, values: &HashMap<String, String>) -> Result<Map<String, Value>, Vec<FieldError>> {
        let mut props = self.base.clone();
        let mut errors = Vec::new();

        for field in &self.fields {
            let Some(raw) = values.get(&field.key) else {
                if field.required && is_blank(field.value.as_ref()) {
                    errors.push(FieldError::new(&field.key, "is required"));
                }
                continue;
            };
            match coerce(field, raw) {
                Ok(value) => {
                    props.insert(field.key.clone(), value);
                }
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() { Ok(props) } else { Err(errors) }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

fn coerce(field: &FormField, raw: &str) -> Result<Value, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() && field.kind != FieldKind::Checkbox {
        if field.required {
            return Err(FieldError::new(&field.key, "is required"));
        }
        return Ok(match field.kind {
            FieldKind::Text | FieldKind::Color => Value::String(raw.to_owned()),
            _ => Value::Null,
        });
    }

    match &field.kind {
        FieldKind::Text | FieldKind::Color => Ok(Value::String(raw.to_owned())),
        FieldKind::Number => parse_number(trimmed).ok_or_else(|| FieldError::new(&field.key, "must be a number")),
        FieldKind::Checkbox => parse_checkbox(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| FieldError::new(&field.key, "must be true or false")),
        FieldKind::Select(options) => options
            .iter()
            .find(|option| option_label(option) == trimmed)
            .cloned()
            .ok_or_else(|| {
                let labels = options.iter().map(option_label).collect::<Vec<_>>();
                FieldError::new(&field.key, format!("must be one of: {}", labels.join(", ")))
            }),
        FieldKind::Textarea => {
            serde_json::from_str(trimmed).map_err(|_| FieldError::new(&field.key, "must be valid JSON"))
        }
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn parse_checkbox(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Some(true),
        "false" | "off" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "form_test.rs"]
mod tests;
