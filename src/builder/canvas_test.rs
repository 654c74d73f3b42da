use super::*;
use crate::state::test_helpers::{component_with_template, instance_at};
use serde_json::json;

// =============================================================================
// CanvasView
// =============================================================================

#[test]
fn projection_keeps_roots_in_order() {
    let page = Uuid::new_v4();
    let container = instance_at(page, None, 1);
    let instances = vec![
        container.clone(),
        instance_at(page, Some(container.id), 0),
        instance_at(page, None, 0),
        instance_at(page, None, 2),
    ];
    let view = CanvasView::project(&instances);
    assert_eq!(view.len(), 3);
    assert_eq!(view.roots().iter().map(|i| i.order_index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(view.sortable_keys()[1], container.id.to_string());
    assert!(!view.is_empty());
}

#[test]
fn projection_of_nested_only_page_is_empty() {
    let page = Uuid::new_v4();
    let instances = vec![instance_at(page, Some(Uuid::new_v4()), 0)];
    let view = CanvasView::project(&instances);
    assert!(view.is_empty());
    assert!(view.sortable_keys().is_empty());
}

// =============================================================================
// build_tree
// =============================================================================

#[test]
fn tree_nests_children_in_order_and_drops_orphans() {
    let page = Uuid::new_v4();
    let container = instance_at(page, None, 0);
    let second = instance_at(page, Some(container.id), 1);
    let first = instance_at(page, Some(container.id), 0);
    let orphan = instance_at(page, Some(Uuid::new_v4()), 0);
    let tail = instance_at(page, None, 1);
    let instances = vec![tail.clone(), second.clone(), orphan, first.clone(), container.clone()];

    let tree = build_tree(&instances);
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0].instance.id, container.id);
    assert_eq!(
        tree[0].children.iter().map(|n| n.instance.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    assert_eq!(tree[1].instance.id, tail.id);
    assert_eq!(tree.iter().map(RenderNode::size).sum::<usize>(), 4);
}

#[test]
fn tree_depth_is_capped() {
    let page = Uuid::new_v4();
    let mut instances = vec![instance_at(page, None, 0)];
    for _ in 0..(MAX_RENDER_DEPTH + 5) {
        let parent = instances.last().map(|i| i.id);
        instances.push(instance_at(page, parent, 0));
    }
    let tree = build_tree(&instances);
    assert_eq!(tree[0].size(), MAX_RENDER_DEPTH);
}

// =============================================================================
// templates
// =============================================================================

#[test]
fn fill_template_substitutes_and_escapes_props() {
    let props = json!({"text": "<b>Hi</b>", "size": "lg", "count": 3, "flag": true})
        .as_object()
        .cloned()
        .unwrap();
    let html = fill_template(r#"<button class="btn-{size}" data-n="{count}" data-f="{flag}">{text}</button>"#, &props, "");
    assert_eq!(html, r#"<button class="btn-lg" data-n="3" data-f="true">&lt;b&gt;Hi&lt;/b&gt;</button>"#);
}

#[test]
fn fill_template_leaves_unknown_placeholders_empty_and_non_placeholders_intact() {
    let props = serde_json::Map::new();
    assert_eq!(fill_template("<p>{missing}</p>", &props, ""), "<p></p>");
    assert_eq!(fill_template("a { b } {", &props, ""), "a { b } {");
    assert_eq!(fill_template("x{}y", &props, ""), "x{}y");
}

#[test]
fn children_slot_takes_raw_html() {
    let props = serde_json::Map::new();
    assert_eq!(fill_template("<div>{children}</div>", &props, "<p>in</p>"), "<div><p>in</p></div>");
}

#[test]
fn instance_props_override_component_defaults() {
    let mut component = component_with_template("Button", Some("<button>{text}</button>"));
    component.default_props = json!({"text": "Click me", "size": "md"});
    let page = Uuid::new_v4();
    let mut instance = instance_at(page, None, 0);
    instance.component_id = component.id;
    instance.props = json!({"text": "Buy"});

    let props = resolve_props(&component, &instance);
    assert_eq!(props["text"], "Buy");
    assert_eq!(props["size"], "md");
}

#[test]
fn render_html_nests_children_and_handles_missing_templates() {
    let page = Uuid::new_v4();
    let container = component_with_template("Container", Some("<section>{children}</section>"));
    let text = component_with_template("Text Block", Some("<p>{content}</p>"));
    let bare = component_with_template("Spacer", None);

    let mut root = instance_at(page, None, 0);
    root.component_id = container.id;
    let mut child = instance_at(page, Some(root.id), 0);
    child.component_id = text.id;
    child.props = json!({"content": "hello"});
    let mut spacer = instance_at(page, None, 1);
    spacer.component_id = bare.id;
    let unknown = instance_at(page, None, 2);

    let components = [container, text, bare]
        .into_iter()
        .map(|c| (c.id, c))
        .collect::<HashMap<_, _>>();
    let html = render_html(&build_tree(&[root, child, spacer, unknown.clone()]), &components);

    assert_eq!(
        html,
        format!(
            r#"<section><p>hello</p></section><div data-component="Spacer"></div><div data-missing-component="{}"></div>"#,
            unknown.component_id
        )
    );
}

#[test]
fn escape_html_covers_attribute_breakers() {
    assert_eq!(escape_html(r#"a&b<c>"d"'e'"#), "a&amp;b&lt;c&gt;&quot;d&quot;&#39;e&#39;");
}
