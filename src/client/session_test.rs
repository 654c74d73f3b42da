use super::*;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;

use crate::builder::form::FieldKind;
use crate::model::{ErrorBody, NewInstance, ReorderRequest};
use crate::state::test_helpers::{component_with_template, instance_at, instance_with_id};

// =========================================================================
// MockApi
// =========================================================================

#[derive(Default)]
struct MockApi {
    components: Vec<Component>,
    instances: Mutex<Vec<ComponentInstance>>,
    calls: Mutex<Vec<String>>,
    creates: Mutex<Vec<NewInstance>>,
    reorders: Mutex<Vec<ReorderRequest>>,
    patches: Mutex<Vec<(Uuid, InstancePatch)>>,
    fail_reorder: bool,
    hang_create: bool,
}

impl MockApi {
    fn with_instances(instances: Vec<ComponentInstance>) -> Self {
        Self { instances: Mutex::new(instances), ..Self::default() }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_owned());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

fn conflict() -> ClientError {
    ClientError::Api {
        status: 409,
        body: ErrorBody { code: "E_SIBLING_MISMATCH".into(), message: "group changed".into(), retryable: false },
    }
}

#[async_trait::async_trait]
impl BuilderApi for MockApi {
    async fn list_components(&self, _filter: &ComponentFilter) -> Result<Vec<Component>, ClientError> {
        self.record("list_components");
        Ok(self.components.clone())
    }

    async fn list_instances(&self, _page_id: Uuid) -> Result<Vec<ComponentInstance>, ClientError> {
        self.record("list_instances");
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn create_instance(&self, page_id: Uuid, body: &NewInstance) -> Result<ComponentInstance, ClientError> {
        self.record("create_instance");
        if self.hang_create {
            std::future::pending::<()>().await;
        }
        self.creates.lock().unwrap().push(body.clone());
        let mut created = instance_at(page_id, body.parent_id, body.order_index.unwrap_or(0));
        created.component_id = body.component_id;
        Ok(created)
    }

    async fn update_instance(&self, instance_id: Uuid, patch: &InstancePatch) -> Result<ComponentInstance, ClientError> {
        self.record("update_instance");
        self.patches.lock().unwrap().push((instance_id, patch.clone()));
        let mut all = self.instances.lock().unwrap();
        let target = all.iter_mut().find(|i| i.id == instance_id).ok_or_else(conflict)?;
        if let Some(props) = &patch.props {
            target.props = props.clone();
        }
        target.version += 1;
        Ok(target.clone())
    }

    async fn reorder_instances(
        &self,
        page_id: Uuid,
        request: &ReorderRequest,
    ) -> Result<Vec<ComponentInstance>, ClientError> {
        self.record("reorder_instances");
        self.reorders.lock().unwrap().push(request.clone());
        if self.fail_reorder {
            return Err(conflict());
        }
        Ok(request
            .ordered_ids
            .iter()
            .enumerate()
            .map(|(i, id)| instance_with_id(*id, page_id, request.parent_id, i32::try_from(i).unwrap()))
            .collect())
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), ClientError> {
        self.record("delete_instance");
        self.instances.lock().unwrap().retain(|i| i.id != instance_id);
        Ok(())
    }
}

/// Page with roots A, B, C at indices 0, 1, 2.
fn abc_page() -> (Uuid, [Uuid; 3], Vec<ComponentInstance>) {
    let page = Uuid::new_v4();
    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let instances = ids
        .iter()
        .zip(0..)
        .map(|(id, order)| instance_with_id(*id, page, None, order))
        .collect();
    (page, ids, instances)
}

fn dragged(instance_id: Uuid, parent_id: Option<Uuid>) -> DragSource {
    DragSource::Instance { instance_id, parent_id }
}

fn over(instance_id: Uuid, parent_id: Option<Uuid>) -> DropTarget {
    DropTarget::Instance { instance_id, parent_id }
}

// =========================================================================
// reorder
// =========================================================================

#[tokio::test]
async fn moving_last_root_to_front_sends_one_batch() {
    let (page, [a, b, c], instances) = abc_page();
    let api = std::sync::Arc::new(MockApi::with_instances(instances));
    let mut session = BuilderSession::new(api.clone(), page);

    session.drag_start(dragged(c, None)).unwrap();
    let outcome = session.drop_on(over(a, None)).await.unwrap();

    let DropOutcome::Reordered(group) = outcome else {
        panic!("expected reorder, got {outcome:?}");
    };
    assert_eq!(group.iter().map(|i| i.id).collect::<Vec<_>>(), vec![c, a, b]);
    assert_eq!(api.count("reorder_instances"), 1);
    assert_eq!(api.count("update_instance"), 0);
    assert_eq!(
        api.reorders.lock().unwrap()[0],
        ReorderRequest { parent_id: None, ordered_ids: vec![c, a, b] }
    );
    assert!(session.drag_machine().is_idle());
    // Invalidated after the mutation.
    assert!(session.cached_instances().is_none());
}

#[tokio::test]
async fn failed_reorder_restores_cached_order() {
    let (page, [a, b, c], instances) = abc_page();
    let api = std::sync::Arc::new(MockApi { fail_reorder: true, ..MockApi::with_instances(instances) });
    let mut session = BuilderSession::new(api.clone(), page);

    session.drag_start(dragged(c, None)).unwrap();
    let err = session.drop_on(over(a, None)).await.unwrap_err();

    assert_eq!(err.error_code(), "E_API");
    let cached = session.cached_instances().unwrap();
    assert_eq!(cached.iter().map(|i| (i.id, i.order_index)).collect::<Vec<_>>(), vec![(a, 0), (b, 1), (c, 2)]);
    assert!(session.drag_machine().is_idle());
}

#[tokio::test]
async fn cross_parent_drop_issues_no_request() {
    let page = Uuid::new_v4();
    let root = instance_at(page, None, 0);
    let child = instance_at(page, Some(root.id), 0);
    let (root_id, child_id) = (root.id, child.id);
    let api = std::sync::Arc::new(MockApi::with_instances(vec![root, child]));
    let mut session = BuilderSession::new(api.clone(), page);

    session.drag_start(dragged(child_id, Some(root_id))).unwrap();
    let outcome = session.drop_on(over(root_id, None)).await.unwrap();

    assert_eq!(outcome, DropOutcome::Ignored(IgnoreReason::CrossParent));
    assert_eq!(api.calls(), vec!["list_instances"]);
    assert!(session.cached_instances().is_some());
}

// =========================================================================
// create
// =========================================================================

#[tokio::test]
async fn library_drop_on_canvas_appends_after_roots() {
    let (page, _, instances) = abc_page();
    let api = std::sync::Arc::new(MockApi::with_instances(instances));
    let mut session = BuilderSession::new(api.clone(), page);
    let component_id = Uuid::new_v4();

    session.drag_start(DragSource::Library { component_id }).unwrap();
    let outcome = session.drop_on(DropTarget::CanvasRoot).await.unwrap();

    let DropOutcome::Created(created) = outcome else {
        panic!("expected create");
    };
    assert_eq!(created.component_id, component_id);
    let body = api.creates.lock().unwrap()[0].clone();
    assert_eq!(body.parent_id, None);
    assert_eq!(body.order_index, Some(3));
}

#[tokio::test]
async fn library_drop_on_container_inserts_first() {
    let (page, [a, _, _], instances) = abc_page();
    let api = std::sync::Arc::new(MockApi::with_instances(instances));
    let mut session = BuilderSession::new(api.clone(), page);

    session.drag_start(DragSource::Library { component_id: Uuid::new_v4() }).unwrap();
    session.drop_on(DropTarget::DroppableArea { parent_id: a }).await.unwrap();

    let body = api.creates.lock().unwrap()[0].clone();
    assert_eq!(body.parent_id, Some(a));
    assert_eq!(body.order_index, Some(0));
}

#[tokio::test]
async fn drag_cannot_start_while_a_drop_is_committing() {
    let (page, _, instances) = abc_page();
    let api = std::sync::Arc::new(MockApi { hang_create: true, ..MockApi::with_instances(instances) });
    let mut session = BuilderSession::new(api.clone(), page);

    session.drag_start(DragSource::Library { component_id: Uuid::new_v4() }).unwrap();
    let pending = tokio::time::timeout(Duration::from_millis(20), session.drop_on(DropTarget::CanvasRoot)).await;
    assert!(pending.is_err());

    let err = session.drag_start(DragSource::Library { component_id: Uuid::new_v4() }).unwrap_err();
    assert!(matches!(err, SessionError::Drag(DragError::Busy)));
    assert!(err.retryable());

    session.reset_drag();
    assert!(session.drag_start(DragSource::Library { component_id: Uuid::new_v4() }).is_ok());
}

#[tokio::test]
async fn drop_without_drag_is_rejected() {
    let api = MockApi::default();
    let mut session = BuilderSession::new(api, Uuid::new_v4());
    let err = session.drop_on(DropTarget::CanvasRoot).await.unwrap_err();
    assert!(matches!(err, SessionError::Drag(DragError::NotDragging)));
}

// =========================================================================
// selection and properties
// =========================================================================

fn button_page() -> (Uuid, Component, ComponentInstance) {
    let page = Uuid::new_v4();
    let mut component = component_with_template("Button", Some("<button>{text}</button>"));
    component.schema = json!({
        "properties": {
            "text": {"type": "string"},
            "variant": {"type": "string", "enum": ["primary", "secondary"]}
        },
        "required": ["text"]
    });
    component.default_props = json!({"text": "Click", "variant": "primary"});
    let mut instance = instance_at(page, None, 0);
    instance.component_id = component.id;
    (page, component, instance)
}

#[tokio::test]
async fn panel_is_empty_without_selection() {
    let api = MockApi::default();
    let mut session = BuilderSession::new(api, Uuid::new_v4());
    assert_eq!(session.property_panel().await.unwrap(), PanelState::Empty);
}

#[tokio::test]
async fn selected_instance_gets_a_form_and_saves_full_props() {
    let (page, component, instance) = button_page();
    let instance_id = instance.id;
    let api = std::sync::Arc::new(MockApi {
        components: vec![component],
        ..MockApi::with_instances(vec![instance])
    });
    let mut session = BuilderSession::new(api.clone(), page);
    session.select(instance_id);

    let PanelState::Editing(form) = session.property_panel().await.unwrap() else {
        panic!("expected form");
    };
    assert_eq!(form.title, "Button");
    assert_eq!(form.field("variant").unwrap().kind, FieldKind::Select(vec!["primary".into(), "secondary".into()]));

    let values = HashMap::from([("variant".to_owned(), "secondary".to_owned())]);
    let updated = session.submit_properties(&values).await.unwrap();
    assert_eq!(updated.props, json!({"text": "Click", "variant": "secondary"}));

    let patches = api.patches.lock().unwrap();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].1.expected_version, Some(1));
    assert!(patches[0].1.parent_id.is_none());
}

#[tokio::test]
async fn invalid_properties_are_not_sent() {
    let (page, component, instance) = button_page();
    let instance_id = instance.id;
    let api = std::sync::Arc::new(MockApi {
        components: vec![component],
        ..MockApi::with_instances(vec![instance])
    });
    let mut session = BuilderSession::new(api.clone(), page);
    session.select(instance_id);

    let values = HashMap::from([
        ("text".to_owned(), String::new()),
        ("variant".to_owned(), "ghost".to_owned()),
    ]);
    let err = session.submit_properties(&values).await.unwrap_err();
    let SessionError::InvalidProperties(errors) = &err else {
        panic!("expected field errors, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    assert_eq!(err.error_code(), "E_INVALID_PROPERTIES");
    assert_eq!(api.count("update_instance"), 0);
}

#[tokio::test]
async fn submit_without_selection_fails() {
    let mut session = BuilderSession::new(MockApi::default(), Uuid::new_v4());
    let err = session.submit_properties(&HashMap::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::NothingSelected));
}

#[tokio::test]
async fn stale_selection_is_cleared() {
    let (page, _, instances) = abc_page();
    let mut session = BuilderSession::new(MockApi::with_instances(instances), page);
    session.select(Uuid::new_v4());
    assert_eq!(session.property_panel().await.unwrap(), PanelState::Empty);
    assert_eq!(session.selected(), None);
}

#[tokio::test]
async fn delete_selected_clears_selection_and_cache() {
    let (page, [a, _, _], instances) = abc_page();
    let api = std::sync::Arc::new(MockApi::with_instances(instances));
    let mut session = BuilderSession::new(api.clone(), page);
    session.instances().await.unwrap();
    session.select(a);

    assert_eq!(session.delete_selected().await.unwrap(), a);
    assert_eq!(session.selected(), None);
    assert!(session.cached_instances().is_none());
    assert_eq!(session.instances().await.unwrap().len(), 2);
    assert_eq!(api.count("list_instances"), 2);
}

#[tokio::test]
async fn components_are_fetched_once() {
    let api = std::sync::Arc::new(MockApi {
        components: vec![component_with_template("Text Block", None)],
        ..MockApi::default()
    });
    let mut session = BuilderSession::new(api.clone(), Uuid::new_v4());
    assert_eq!(session.components().await.unwrap().len(), 1);
    assert_eq!(session.components().await.unwrap().len(), 1);
    assert_eq!(api.count("list_components"), 1);

    session.invalidate_components();
    session.components().await.unwrap();
    assert_eq!(api.count("list_components"), 2);
}
