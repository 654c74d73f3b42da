//! Canvas projection and HTML rendering.
//!
//! DESIGN
//! ======
//! The canvas shows root instances only, sorted by order index, and each
//! rendered instance carries its sorted children. A component template is
//! plain HTML with `{prop}` placeholders and a `{children}` slot. Prop values
//! are escaped; the children slot receives already-rendered HTML.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;
use uuid::Uuid;

use crate::builder::order::sort_siblings;
use crate::model::{Component, ComponentInstance};

/// Nesting deeper than this is cut off when building the render tree.
pub const MAX_RENDER_DEPTH: usize = 32;

const CHILDREN_SLOT: &str = "children";

// =============================================================================
// CANVAS VIEW
// =============================================================================

/// Root instances of a page in display order.
#[derive(Debug, Clone)]
pub struct CanvasView<'a> {
    roots: Vec<&'a ComponentInstance>,
}

impl<'a> CanvasView<'a> {
    #[must_use]
    pub fn project(instances: &'a [ComponentInstance]) -> Self {
        Self { roots: sort_siblings(instances, None) }
    }

    #[must_use]
    pub fn roots(&self) -> &[&'a ComponentInstance] {
        &self.roots
    }

    /// Keys registered with the sortable root context, in display order.
    #[must_use]
    pub fn sortable_keys(&self) -> Vec<String> {
        self.roots.iter().map(|instance| instance.id.to_string()).collect()
    }

    /// An empty canvas still accepts library drops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }
}

// =============================================================================
// RENDER TREE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub instance: ComponentInstance,
    pub children: Vec<RenderNode>,
}

impl RenderNode {
    /// Number of instances in this subtree, including this one.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(RenderNode::size).sum::<usize>()
    }
}

/// Build the nested tree of root instances and their sorted children.
///
/// Instances whose parent is not on the page never become reachable from a
/// root and are left out.
#[must_use]
pub fn build_tree(instances: &[ComponentInstance]) -> Vec<RenderNode> {
    let mut by_parent: HashMap<Option<Uuid>, Vec<&ComponentInstance>> = HashMap::new();
    for instance in instances {
        by_parent.entry(instance.parent_id).or_default().push(instance);
    }
    for group in by_parent.values_mut() {
        group.sort_by_key(|instance| (instance.order_index, instance.id));
    }
    build_level(&by_parent, None, 0)
}

fn build_level(
    by_parent: &HashMap<Option<Uuid>, Vec<&ComponentInstance>>,
    parent_id: Option<Uuid>,
    depth: usize,
) -> Vec<RenderNode> {
    if depth >= MAX_RENDER_DEPTH {
        tracing::warn!(?parent_id, depth, "render depth limit reached; subtree dropped");
        return Vec::new();
    }
    let Some(group) = by_parent.get(&parent_id) else {
        return Vec::new();
    };
    group
        .iter()
        .map(|instance| RenderNode {
            instance: (*instance).clone(),
            children: build_level(by_parent, Some(instance.id), depth + 1),
        })
        .collect()
}

// =============================================================================
// HTML
// =============================================================================

/// Render a forest of nodes to HTML using each component's template.
#[must_use]
pub fn render_html(nodes: &[RenderNode], components: &HashMap<Uuid, Component>) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(&mut out, node, components);
    }
    out
}

fn render_node(out: &mut String, node: &RenderNode, components: &HashMap<Uuid, Component>) {
    let children = render_html(&node.children, components);
    let Some(component) = components.get(&node.instance.component_id) else {
        let _ = write!(
            out,
            r#"<div data-missing-component="{}">{children}</div>"#,
            node.instance.component_id
        );
        return;
    };
    match component.template.as_deref() {
        Some(template) => {
            let props = resolve_props(component, &node.instance);
            out.push_str(fill_template(template, &props, &children).trim());
        }
        None => {
            let _ = write!(
                out,
                r#"<div data-component="{}">{children}</div>"#,
                escape_html(&component.name)
            );
        }
    }
}

/// Instance props layered over the component's default props.
#[must_use]
pub fn resolve_props(component: &Component, instance: &ComponentInstance) -> serde_json::Map<String, serde_json::Value> {
    let mut props = component.default_props.as_object().cloned().unwrap_or_default();
    if let Some(own) = instance.props.as_object() {
        for (key, value) in own {
            props.insert(key.clone(), value.clone());
        }
    }
    props
}

/// Substitute `{name}` placeholders. `{children}` takes raw HTML, every other
/// placeholder takes the escaped prop value or nothing when the prop is
/// unset. Braces that do not enclose an identifier are copied through.
#[must_use]
pub fn fill_template(template: &str, props: &serde_json::Map<String, serde_json::Value>, children: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        if !is_placeholder(key) {
            out.push('{');
            rest = after;
            continue;
        }
        if key == CHILDREN_SLOT {
            out.push_str(children);
        } else if let Some(value) = props.get(key) {
            out.push_str(&escape_html(&prop_text(value)));
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_placeholder(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn prop_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
#[path = "canvas_test.rs"]
mod tests;
