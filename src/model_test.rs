use super::*;
use serde_json::json;

#[test]
fn page_path_from_title_kebabs_words() {
    assert_eq!(page_path_from_title("Landing Page"), "/landing-page");
    assert_eq!(page_path_from_title("  About   Us!! "), "/about-us");
    assert_eq!(page_path_from_title("Q3 Report"), "/q3-report");
}

#[test]
fn page_path_from_title_without_alphanumerics_is_root() {
    assert_eq!(page_path_from_title("***"), "/");
}

#[test]
fn component_accepts_component_schema_alias() {
    let raw = json!({
        "id": Uuid::nil(),
        "name": "Button",
        "component_schema": {"properties": {"text": {"type": "string"}}},
    });
    let component: Component = serde_json::from_value(raw).unwrap();
    assert_eq!(component.schema["properties"]["text"]["type"], "string");
    assert_eq!(component.component_type, "custom");
    assert_eq!(component.default_props, json!({}));
    assert!(!component.is_global);
}

#[test]
fn component_label_prefers_display_name() {
    let raw = json!({"id": Uuid::nil(), "name": "text_block", "display_name": "Text Block"});
    let component: Component = serde_json::from_value(raw).unwrap();
    assert_eq!(component.label(), "Text Block");

    let raw = json!({"id": Uuid::nil(), "name": "text_block"});
    let component: Component = serde_json::from_value(raw).unwrap();
    assert_eq!(component.label(), "text_block");
}

#[test]
fn instance_layout_is_flattened_on_the_wire() {
    let instance = ComponentInstance {
        id: Uuid::new_v4(),
        component_id: Uuid::new_v4(),
        page_id: Uuid::new_v4(),
        parent_id: None,
        props: json!({"text": "hi"}),
        order_index: 2,
        layout: Layout { x: Some(10.0), y: None, width: Some(120.0), height: None },
        version: 3,
    };
    let value = serde_json::to_value(&instance).unwrap();
    assert_eq!(value["x"], json!(10.0));
    assert_eq!(value["width"], json!(120.0));
    assert!(value.get("layout").is_none());

    let restored: ComponentInstance = serde_json::from_value(value).unwrap();
    assert_eq!(restored, instance);
}

#[test]
fn instance_missing_version_defaults_to_one() {
    let raw = json!({
        "id": Uuid::nil(),
        "component_id": Uuid::nil(),
        "page_id": Uuid::nil(),
        "order_index": 0,
    });
    let instance: ComponentInstance = serde_json::from_value(raw).unwrap();
    assert_eq!(instance.version, 1);
    assert_eq!(instance.parent_id, None);
    assert_eq!(instance.layout, Layout::default());
}

#[test]
fn instance_patch_distinguishes_null_parent_from_absent() {
    let absent: InstancePatch = serde_json::from_value(json!({})).unwrap();
    assert_eq!(absent.parent_id, None);

    let to_root: InstancePatch = serde_json::from_value(json!({"parent_id": null})).unwrap();
    assert_eq!(to_root.parent_id, Some(None));

    let parent = Uuid::new_v4();
    let nested: InstancePatch = serde_json::from_value(json!({"parent_id": parent})).unwrap();
    assert_eq!(nested.parent_id, Some(Some(parent)));
}

#[test]
fn instance_patch_serializes_only_present_fields() {
    let patch = InstancePatch { parent_id: Some(None), ..InstancePatch::default() };
    let value = serde_json::to_value(&patch).unwrap();
    assert_eq!(value, json!({"parent_id": null}));
}

#[test]
fn new_instance_omits_unset_order_index() {
    let body = NewInstance {
        component_id: Uuid::nil(),
        parent_id: None,
        props: None,
        order_index: None,
        layout: Layout::default(),
    };
    let value = serde_json::to_value(&body).unwrap();
    assert!(value.get("order_index").is_none());
    assert!(value.get("props").is_none());
}

#[test]
fn component_filter_skips_empty_fields() {
    let filter = ComponentFilter { category: Some("basic".into()), ..ComponentFilter::default() };
    assert_eq!(serde_json::to_value(&filter).unwrap(), json!({"category": "basic"}));
}
